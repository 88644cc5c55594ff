use std::ffi::OsString;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::config::Config;
use crate::error::{DecodeError, Result};

use super::clock::format_clock;
use super::excerpt::{plan_excerpt, ExcerptPlan, ExcerptRequest};
use super::probe::DurationProbe;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// A fully rendered ffmpeg invocation. Arguments are passed to the process
/// as-is, never through a shell.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeCommand {
    program: String,
    args: Vec<OsString>,
}

impl DecodeCommand {
    /// Build the command decoding `path` to raw f32le mono at `sample_rate`,
    /// windowed when `plan` has a non-zero length.
    pub fn new(
        program: impl Into<String>,
        path: &Path,
        plan: ExcerptPlan,
        sample_rate: u32,
    ) -> Self {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "panic"]
            .iter()
            .map(OsString::from)
            .collect();

        if !plan.is_whole_file() {
            args.push("-ss".into());
            args.push(format_clock(plan.start).into());
            args.push("-t".into());
            args.push(format_clock(plan.length).into());
        }

        args.push("-i".into());
        args.push(path.as_os_str().to_os_string());
        args.extend(
            ["-f", "f32le", "-ar", &sample_rate.to_string(), "-ac", "1", "pipe:1"]
                .iter()
                .map(OsString::from),
        );

        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for DecodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Reaps the child on every exit path. Anything not waited for explicitly is
/// killed when the guard drops.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn wait(mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            debug!("Killing decoder process {}", self.child.id());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Decodes audio files to mono f32 PCM through ffmpeg.
#[derive(Debug, Clone)]
pub struct Decoder {
    probe: DurationProbe,
    ffmpeg: String,
    sample_rate: u32,
    min_duration_secs: u32,
    read_block_samples: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Decoder {
    pub fn new(config: &Config) -> Self {
        Self {
            probe: DurationProbe::from_config(config),
            ffmpeg: config.ffmpeg_path.clone(),
            sample_rate: config.sample_rate,
            min_duration_secs: config.min_duration_secs,
            read_block_samples: config.read_block_samples.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn command_for(&self, path: &Path, plan: ExcerptPlan) -> DecodeCommand {
        DecodeCommand::new(self.ffmpeg.clone(), path, plan, self.sample_rate)
    }

    /// Decode `path`, returning an empty buffer on any failure or when the
    /// file is too short.
    pub fn decode(&self, path: &Path, request: ExcerptRequest) -> Vec<f32> {
        match self.try_decode(path, request) {
            Ok(pcm) => pcm,
            Err(e) => {
                debug!("Decoding {} failed: {e}", path.display());
                Vec::new()
            }
        }
    }

    /// Decode `path`. Files whose duration is unknown or below the floor
    /// yield `Ok` with no samples; tool and pipe failures are errors.
    pub fn try_decode(&self, path: &Path, request: ExcerptRequest) -> Result<Vec<f32>> {
        debug!("Decoding: {} started.", path.display());

        let probed = self.probe.try_probe(path)?;
        let Some(duration) = probed.filter(|d| *d >= self.min_duration_secs) else {
            debug!(
                "Skipping {}: duration {:?} is below {}s",
                path.display(),
                probed,
                self.min_duration_secs
            );
            return Ok(Vec::new());
        };

        let plan = plan_excerpt(duration, request);
        debug!("Excerpt plan: {:?} for duration {}s", plan, duration);

        let command = self.command_for(path, plan);
        debug!("Running command: {command}");

        let child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DecodeError::spawn(command.program(), e))?;
        let mut guard = ChildGuard::new(child);

        let pcm = match guard.child.stdout.take() {
            Some(mut stdout) => read_samples(&mut stdout, self.read_block_samples)?,
            None => Vec::new(),
        };

        let status = guard.wait()?;
        if !status.success() {
            debug!("{} exited with {status}", command.program());
        }

        debug!(
            "Decoding: {} finalized, samples: {}",
            path.display(),
            pcm.len()
        );
        Ok(pcm)
    }
}

/// Read little-endian f32 samples until end of stream, `block_samples` at a
/// time. A short final block is kept; bytes that do not form a whole sample
/// are dropped.
pub fn read_samples<R: Read>(reader: &mut R, block_samples: usize) -> std::io::Result<Vec<f32>> {
    let mut block = vec![0u8; block_samples.max(1) * SAMPLE_BYTES];
    let mut pcm = Vec::new();
    let mut filled = 0;

    loop {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                if filled == block.len() {
                    append_samples(&mut pcm, &block);
                    filled = 0;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    append_samples(&mut pcm, &block[..filled]);
    let dangling = filled % SAMPLE_BYTES;
    if dangling != 0 {
        debug!("Dropping {dangling} trailing bytes of an incomplete sample");
    }

    Ok(pcm)
}

fn append_samples(pcm: &mut Vec<f32>, bytes: &[u8]) {
    pcm.extend(
        bytes
            .chunks_exact(SAMPLE_BYTES)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
}
