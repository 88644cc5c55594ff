use crate::error::{DecodeError, Result};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output sample rate expected by the similarity models.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Files shorter than this are not worth decoding.
pub const DEFAULT_MIN_DURATION_SECS: u32 = 10;

/// Samples requested per read from the decoder pipe.
pub const DEFAULT_READ_BLOCK_SAMPLES: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub sample_rate: u32,
    pub min_duration_secs: u32,
    pub read_block_samples: usize,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            min_duration_secs: DEFAULT_MIN_DURATION_SECS,
            read_block_samples: DEFAULT_READ_BLOCK_SAMPLES,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = Self::from_toml_str(&contents) {
                    config = file_config;
                }
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(contents)?)
    }

    /// Override fields from environment-style lookups. Values that fail to
    /// parse are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PCMEXCERPT_FFMPEG") {
            self.ffmpeg_path = path;
        }
        if let Some(path) = lookup("PCMEXCERPT_FFPROBE") {
            self.ffprobe_path = path;
        }
        if let Some(rate) = lookup("PCMEXCERPT_SAMPLE_RATE") {
            if let Ok(r) = rate.parse() {
                self.sample_rate = r;
            }
        }
        if let Some(min) = lookup("PCMEXCERPT_MIN_DURATION") {
            if let Ok(m) = min.parse() {
                self.min_duration_secs = m;
            }
        }
        if let Some(block) = lookup("PCMEXCERPT_READ_BLOCK") {
            if let Ok(b) = block.parse() {
                self.read_block_samples = b;
            }
        }
        if let Some(level) = lookup("PCMEXCERPT_LOG") {
            if let Ok(l) = level.parse() {
                self.log_level = l;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(DecodeError::Config(
                "ffmpeg_path must not be empty".to_string(),
            ));
        }
        if self.ffprobe_path.trim().is_empty() {
            return Err(DecodeError::Config(
                "ffprobe_path must not be empty".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(DecodeError::Config(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.min_duration_secs == 0 {
            return Err(DecodeError::Config(
                "Minimum duration must be greater than 0".to_string(),
            ));
        }
        if self.read_block_samples == 0 {
            return Err(DecodeError::Config(
                "Read block size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pcmexcerpt").join("config.toml"))
    }
}
