use std::io::{BufRead, ErrorKind};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::Config;
use crate::error::{DecodeError, Result};

use super::duration_or_sentinel;

const DURATION_MARKER: &str = "Duration: ";
const START_MARKER: &str = "start:";

/// Bytes that must follow the duration marker on the same line. Shorter
/// tails cannot hold `HH:MM:SS.ff, start: ...`.
pub const MIN_PAYLOAD_LEN: usize = 20;

/// Finds the playable length of a file by asking ffprobe.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    program: String,
}

impl DurationProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ffprobe_path.clone())
    }

    /// Duration in whole seconds, `None` when it cannot be determined.
    pub fn probe(&self, path: &Path) -> Option<u32> {
        match self.try_probe(path) {
            Ok(duration) => duration,
            Err(e) => {
                debug!("{e}");
                None
            }
        }
    }

    /// Like [`probe`](Self::probe), but reports a failed spawn as an error.
    pub fn try_probe(&self, path: &Path) -> Result<Option<u32>> {
        debug!(
            "Running command: {} -hide_banner {:?}",
            self.program,
            path.display().to_string()
        );

        let output = Command::new(&self.program)
            .arg("-hide_banner")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DecodeError::spawn(&self.program, e))?;

        // ffprobe prints its report on stderr; scan both streams as one text.
        let mut report = output.stdout;
        if !report.is_empty() && !report.ends_with(b"\n") {
            report.push(b'\n');
        }
        report.extend_from_slice(&output.stderr);

        let duration = parse_duration_report(report.as_slice());
        debug!("File duration: {}", duration_or_sentinel(duration));
        Ok(duration)
    }
}

/// Scan probe output for the first `Duration: H:MM:SS.ff, start: ...` line.
///
/// Scanning stops at the first line carrying that structure. If its clock
/// text does not parse, the result is `None` even when later lines would.
pub fn parse_duration_report<R: BufRead>(mut reader: R) -> Option<u32> {
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Failed to read probe output: {e}");
                return None;
            }
        }

        let line = String::from_utf8_lossy(&raw);
        if let Some(clock) = match_duration_line(&line) {
            return parse_clock_text(clock);
        }
    }
}

/// Returns the clock text between the duration marker and the first comma.
fn match_duration_line(line: &str) -> Option<&str> {
    let marker = line.find(DURATION_MARKER)?;
    let payload_start = marker + DURATION_MARKER.len();
    if payload_start + MIN_PAYLOAD_LEN >= line.len() {
        return None;
    }

    let payload = &line[payload_start..];
    let start = payload.find(START_MARKER)?;
    let comma = payload.find(',')?;
    if comma > start {
        return None;
    }
    Some(&payload[..comma])
}

/// Parse `H:MM:SS.fff` into whole seconds; the fraction is dropped.
fn parse_clock_text(text: &str) -> Option<u32> {
    let mut fields = text.splitn(3, ':');
    let hours: i64 = fields.next()?.trim_start().parse().ok()?;
    let minutes: i64 = fields.next()?.trim_start().parse().ok()?;
    let seconds: f64 = fields.next()?.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds.trunc() as i64)?;
    u32::try_from(total).ok()
}
