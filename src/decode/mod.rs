pub mod clock;
pub mod excerpt;
pub mod probe;
pub mod stream;

pub use clock::format_clock;
pub use excerpt::{plan_excerpt, ExcerptPlan, ExcerptRequest};
pub use probe::{parse_duration_report, DurationProbe};
pub use stream::{read_samples, DecodeCommand, Decoder};

use crate::config::Config;
use std::path::Path;

/// Numeric stand-in for an unknown duration.
pub const UNKNOWN_DURATION: i64 = -1;

/// Map a probed duration to seconds, or [`UNKNOWN_DURATION`].
pub fn duration_or_sentinel(duration: Option<u32>) -> i64 {
    duration.map_or(UNKNOWN_DURATION, i64::from)
}

/// A named decoder producing 22050 Hz mono float samples.
pub trait AudioDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode an excerpt of `path`. Failures yield an empty buffer.
    fn decode_to_22050hz_mono_float(
        &self,
        path: &Path,
        excerpt_length: f32,
        excerpt_start: f32,
    ) -> Vec<f32>;
}

impl AudioDecoder for Decoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode_to_22050hz_mono_float(
        &self,
        path: &Path,
        excerpt_length: f32,
        excerpt_start: f32,
    ) -> Vec<f32> {
        self.decode(path, ExcerptRequest::new(excerpt_length, excerpt_start))
    }
}

pub fn available_decoders() -> &'static [&'static str] {
    &["ffmpeg"]
}

/// Look up a decoder by name (case-insensitive).
pub fn create_decoder(name: &str, config: &Config) -> Option<Box<dyn AudioDecoder>> {
    match name.to_lowercase().as_str() {
        "ffmpeg" => Some(Box::new(Decoder::new(config))),
        _ => None,
    }
}
