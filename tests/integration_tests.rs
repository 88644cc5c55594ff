//! End-to-end tests for the decoder.
//!
//! ffprobe and ffmpeg are replaced by small shell scripts so the tests run
//! without FFmpeg installed. The fake ffmpeg records its arguments next to the
//! input file (`<input>.args`), one per line.
#![cfg(unix)]

use pcmexcerpt::config::Config;
use pcmexcerpt::decode::{
    create_decoder, duration_or_sentinel, Decoder, DurationProbe, ExcerptRequest,
};
use pcmexcerpt::error::DecodeError;
use pcmexcerpt::logging::{LogLevel, LogTarget, Logging, SharedBuffer};

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

const LARGE_SAMPLES: usize = 120_000;

// ============================================================================
// Fake tools
// ============================================================================

struct Tools {
    dir: TempDir,
}

impl Tools {
    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn probe_script(report_line: &str) -> String {
    format!(
        "echo \"Input #0, mp3, from '$2':\" >&2\n\
         echo '  Metadata:' >&2\n\
         echo '{report_line}' >&2\n\
         echo '  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 128 kb/s' >&2\n"
    )
}

fn ffmpeg_script(samples_file: &Path) -> String {
    format!(
        "input=''\n\
         prev=''\n\
         for arg in \"$@\"; do\n\
         \x20 if [ \"$prev\" = '-i' ]; then input=\"$arg\"; fi\n\
         \x20 prev=\"$arg\"\n\
         done\n\
         printf '%s\\n' \"$@\" > \"$input.args\"\n\
         cat '{}'\n",
        samples_file.display()
    )
}

/// Scripts are created once, before any test spawns a process, so no script
/// is ever executed while a writable handle to it is open.
fn tools() -> &'static Tools {
    static TOOLS: OnceLock<Tools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        // Three samples of 1.0 followed by two stray bytes.
        let mut small: Vec<u8> = [1.0f32; 3].iter().flat_map(|s| s.to_le_bytes()).collect();
        small.extend_from_slice(&[0x01, 0x02]);
        fs::write(root.join("small.f32"), &small).unwrap();

        let large: Vec<u8> = (0..LARGE_SAMPLES)
            .flat_map(|i| (i as f32).to_le_bytes())
            .collect();
        fs::write(root.join("large.f32"), &large).unwrap();

        write_script(
            root,
            "ffprobe-90s",
            &probe_script("  Duration: 00:01:30.50, start: 0.000000, bitrate: 128 kb/s"),
        );
        write_script(
            root,
            "ffprobe-5s",
            &probe_script("  Duration: 00:00:05.00, start: 0.000000, bitrate: 128 kb/s"),
        );
        write_script(
            root,
            "ffprobe-no-start",
            &probe_script("  Duration: 00:01:30.50, bitrate: 128 kb/s"),
        );
        write_script(root, "ffprobe-broken", "echo 'No such file or directory' >&2\nexit 1\n");
        write_script(root, "ffmpeg-small", &ffmpeg_script(&root.join("small.f32")));
        write_script(root, "ffmpeg-large", &ffmpeg_script(&root.join("large.f32")));

        Tools { dir }
    })
}

fn config(ffprobe: &str, ffmpeg: &str) -> Config {
    let tools = tools();
    Config {
        ffprobe_path: tools.path(ffprobe),
        ffmpeg_path: tools.path(ffmpeg),
        ..Config::default()
    }
}

fn input_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"not really audio").unwrap();
    path
}

fn recorded_args(input: &Path) -> Option<Vec<String>> {
    let mut args_path = input.as_os_str().to_os_string();
    args_path.push(".args");
    fs::read_to_string(args_path)
        .ok()
        .map(|s| s.lines().map(str::to_string).collect())
}

fn window_args(args: &[String]) -> Option<(String, String)> {
    let ss = args.iter().position(|a| a == "-ss")?;
    let t = args.iter().position(|a| a == "-t")?;
    Some((args[ss + 1].clone(), args[t + 1].clone()))
}

// ============================================================================
// Duration probe
// ============================================================================

mod probe_tests {
    use super::*;

    #[test]
    fn test_probe_reads_stderr_report() {
        let probe = DurationProbe::new(tools().path("ffprobe-90s"));
        assert_eq!(probe.probe(Path::new("song.mp3")), Some(90));
    }

    #[test]
    fn test_probe_without_start_marker() {
        let probe = DurationProbe::new(tools().path("ffprobe-no-start"));
        let duration = probe.probe(Path::new("song.mp3"));
        assert_eq!(duration, None);
        assert_eq!(duration_or_sentinel(duration), -1);
    }

    #[test]
    fn test_probe_failing_tool() {
        let probe = DurationProbe::new(tools().path("ffprobe-broken"));
        assert!(matches!(probe.try_probe(Path::new("song.mp3")), Ok(None)));
    }
}

// ============================================================================
// Streaming decode
// ============================================================================

mod decode_tests {
    use super::*;

    #[test]
    fn test_whole_file_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        let pcm = decoder.decode(&input, ExcerptRequest::whole_file());
        assert_eq!(pcm, vec![1.0, 1.0, 1.0]);

        let args = recorded_args(&input).expect("ffmpeg was not run");
        assert_eq!(window_args(&args), None);
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "f32le"));
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "22050"));
        assert!(args.windows(2).any(|w| w[0] == "-ac" && w[1] == "1"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_oversized_excerpt_decodes_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        decoder.decode(&input, ExcerptRequest::new(120.0, -30.0));
        assert_eq!(window_args(&recorded_args(&input).unwrap()), None);
    }

    #[test]
    fn test_centred_excerpt_window() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        decoder.decode(&input, ExcerptRequest::new(20.0, -30.0));
        assert_eq!(
            window_args(&recorded_args(&input).unwrap()),
            Some(("00:00:30.00".to_string(), "00:00:20.00".to_string()))
        );
    }

    #[test]
    fn test_right_aligned_excerpt_window() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        decoder.decode(&input, ExcerptRequest::new(20.0, 80.0));
        assert_eq!(
            window_args(&recorded_args(&input).unwrap()),
            Some(("00:01:10.00".to_string(), "00:00:20.00".to_string()))
        );
    }

    #[test]
    fn test_short_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "jingle.mp3");
        let decoder = Decoder::new(&config("ffprobe-5s", "ffmpeg-small"));

        for request in [
            ExcerptRequest::whole_file(),
            ExcerptRequest::new(2.0, 1.0),
            ExcerptRequest::new(3.0, -1.0),
        ] {
            assert!(decoder.decode(&input, request).is_empty());
        }
        assert!(recorded_args(&input).is_none());
    }

    #[test]
    fn test_minimum_duration_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let config = Config {
            min_duration_secs: 100,
            ..config("ffprobe-90s", "ffmpeg-small")
        };

        assert!(Decoder::new(&config)
            .decode(&input, ExcerptRequest::whole_file())
            .is_empty());
    }

    #[test]
    fn test_unknown_duration_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-no-start", "ffmpeg-small"));

        let result = decoder.try_decode(&input, ExcerptRequest::whole_file());
        assert!(matches!(result, Ok(ref pcm) if pcm.is_empty()));
        assert!(recorded_args(&input).is_none());
    }

    #[test]
    fn test_missing_decoder_tool() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let config = Config {
            ffmpeg_path: "/nonexistent/bin/ffmpeg-missing".to_string(),
            ..config("ffprobe-90s", "ffmpeg-small")
        };
        let decoder = Decoder::new(&config);

        assert!(matches!(
            decoder.try_decode(&input, ExcerptRequest::whole_file()),
            Err(DecodeError::ToolSpawn { .. })
        ));
        assert!(decoder.decode(&input, ExcerptRequest::whole_file()).is_empty());
    }

    #[test]
    fn test_stream_spanning_several_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "album.flac");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-large"));

        let pcm = decoder.decode(&input, ExcerptRequest::whole_file());
        assert_eq!(pcm.len(), LARGE_SAMPLES);
        assert_eq!(pcm[0], 0.0);
        assert_eq!(pcm[50_000], 50_000.0);
        assert_eq!(pcm[LARGE_SAMPLES - 1], (LARGE_SAMPLES - 1) as f32);
    }

    #[test]
    fn test_repeated_decode_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-large"));
        let request = ExcerptRequest::new(30.0, -48.0);

        let first = decoder.decode(&input, request);
        let first_args = recorded_args(&input).unwrap();
        let second = decoder.decode(&input, request);

        assert_eq!(first.len(), second.len());
        assert_eq!(first_args, recorded_args(&input).unwrap());
    }

    #[test]
    fn test_path_is_passed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "my \"best\" song; echo pwned $(id).mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        assert_eq!(decoder.decode(&input, ExcerptRequest::whole_file()).len(), 3);

        let args = recorded_args(&input).unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], input.display().to_string());
    }
}

// ============================================================================
// Registry and logging
// ============================================================================

mod integration_tests {
    use super::*;

    #[test]
    fn test_named_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = create_decoder("ffmpeg", &config("ffprobe-90s", "ffmpeg-small")).unwrap();

        assert_eq!(decoder.name(), "ffmpeg");
        assert_eq!(decoder.decode_to_22050hz_mono_float(&input, 20.0, 10.0).len(), 3);
        assert_eq!(
            window_args(&recorded_args(&input).unwrap()),
            Some(("00:00:10.00".to_string(), "00:00:20.00".to_string()))
        );
    }

    #[test]
    fn test_decode_logs_at_debug() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        let buffer = SharedBuffer::new();
        let logging = Logging::new(LogLevel::Debug, LogTarget::Memory(buffer.clone())).unwrap();
        logging.scoped(|| decoder.decode(&input, ExcerptRequest::whole_file()));

        let out = buffer.contents();
        assert!(out.contains("DEBUG"));
        assert!(out.contains("File duration: 90"));
        assert!(out.contains("finalized, samples: 3"));
    }

    #[test]
    fn test_decode_is_quiet_at_info() {
        let dir = tempfile::tempdir().unwrap();
        let input = input_file(&dir, "song.mp3");
        let decoder = Decoder::new(&config("ffprobe-90s", "ffmpeg-small"));

        let buffer = SharedBuffer::new();
        let logging = Logging::new(LogLevel::Info, LogTarget::Memory(buffer.clone())).unwrap();
        let pcm = logging.scoped(|| decoder.decode(&input, ExcerptRequest::whole_file()));

        assert_eq!(pcm.len(), 3);
        assert!(buffer.contents().is_empty());
    }
}
