use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pcmexcerpt::config::Config;
use pcmexcerpt::decode::{available_decoders, create_decoder};
use pcmexcerpt::logging::{LogLevel, LogTarget, Logging};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser)]
#[command(name = "pcmexcerpt")]
#[command(version, about = "Decode an audio excerpt to mono 32-bit float PCM")]
#[command(long_about = "Decode an audio file (or an excerpt of it) to mono 32-bit float samples using ffprobe and ffmpeg.")]
struct Cli {
    /// Input audio file
    input: PathBuf,

    /// Excerpt length in seconds (0 decodes the whole file)
    #[arg(short = 'l', long, default_value_t = 0.0, allow_negative_numbers = true)]
    excerpt_length: f32,

    /// Excerpt start in seconds; negative values centre the excerpt, starting
    /// no later than the absolute value
    #[arg(short = 's', long, default_value_t = 0.0, allow_negative_numbers = true)]
    excerpt_start: f32,

    /// Write samples to this file (WAV unless --raw)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write headerless little-endian f32 instead of WAV
    #[arg(long)]
    raw: bool,

    /// Decoder to use
    #[arg(short, long, default_value = "ffmpeg")]
    decoder: String,

    /// Log level: none, error, warning, info, debug, trace
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    input: String,
    decoder: String,
    samples: usize,
    sample_rate: u32,
    seconds: f64,
    output: Option<String>,
    elapsed_ms: u128,
}

fn init_logging(cli: &Cli, config: &Config) -> Result<Logging> {
    let logging = Logging::new(config.log_level, LogTarget::Stderr)
        .context("Failed to set up logging")?;
    logging.install_global()?;

    let level = if cli.verbose {
        Some(LogLevel::Debug)
    } else {
        cli.log_level.as_deref().map(LogLevel::parse_or_info)
    };
    if let Some(level) = level {
        logging.set_level(level)?;
    }

    Ok(logging)
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn write_raw(path: &Path, samples: &[f32]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for sample in samples {
        writer.write_all(&sample.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn spinner(input: &Path) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Decoding {}...", input.display()));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let _logging = init_logging(&cli, &config)?;

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    let decoder = create_decoder(&cli.decoder, &config).with_context(|| {
        format!(
            "Unknown decoder '{}'. Available: {}",
            cli.decoder,
            available_decoders().join(", ")
        )
    })?;

    info!("Input:   {}", cli.input.display());
    info!("Decoder: {}", decoder.name());
    info!(
        "Excerpt: length={}s start={}s",
        cli.excerpt_length, cli.excerpt_start
    );

    let started = Instant::now();
    let pb = spinner(&cli.input);
    let samples =
        decoder.decode_to_22050hz_mono_float(&cli.input, cli.excerpt_length, cli.excerpt_start);
    pb.finish_and_clear();

    if samples.is_empty() {
        anyhow::bail!(
            "No samples decoded from {} (unreadable, or shorter than {}s)",
            cli.input.display(),
            config.min_duration_secs
        );
    }

    if let Some(ref output) = cli.output {
        if cli.raw {
            write_raw(output, &samples)?;
        } else {
            write_wav(output, &samples, config.sample_rate)?;
        }
        info!("Samples written to {}", output.display());
    }

    let summary = Summary {
        input: cli.input.display().to_string(),
        decoder: decoder.name().to_string(),
        samples: samples.len(),
        sample_rate: config.sample_rate,
        seconds: samples.len() as f64 / config.sample_rate as f64,
        output: cli.output.as_ref().map(|p| p.display().to_string()),
        elapsed_ms: started.elapsed().as_millis(),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} samples ({:.2}s at {} Hz) decoded with {} in {} ms",
            summary.samples,
            summary.seconds,
            summary.sample_rate,
            summary.decoder,
            summary.elapsed_ms
        );
    }

    Ok(())
}
