//! Leveled, timestamped logging with a single swappable sink.
//!
//! A [`Logging`] value owns the subscriber used by the crate. The binary
//! installs it process-wide with [`Logging::install_global`]; tests run code
//! under [`Logging::scoped`] so every test gets its own level and sink.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::{warn, Dispatch};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, Registry};

use crate::error::{DecodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::None => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    pub fn from_level_filter(filter: LevelFilter) -> Self {
        if filter == LevelFilter::OFF {
            LogLevel::None
        } else if filter == LevelFilter::ERROR {
            LogLevel::Error
        } else if filter == LevelFilter::WARN {
            LogLevel::Warning
        } else if filter == LevelFilter::INFO {
            LogLevel::Info
        } else if filter == LevelFilter::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }

    /// Parse a level name, falling back to `Info` for unknown names.
    pub fn parse_or_info(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: String| {
            warn!("{e}. Using INFO level as default.");
            LogLevel::Info
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::None => "NONE",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Unknown logging level '{s}'")),
        }
    }
}

/// In-memory log sink, mostly useful for tests.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    File(PathBuf),
    Memory(SharedBuffer),
    Disabled,
}

enum Sink {
    Stderr,
    File { path: PathBuf, file: File },
    Memory(SharedBuffer),
    Disabled,
}

impl Sink {
    fn open(target: LogTarget) -> Result<Self> {
        Ok(match target {
            LogTarget::Stderr => Sink::Stderr,
            LogTarget::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                Sink::File { path, file }
            }
            LogTarget::Memory(buffer) => Sink::Memory(buffer),
            LogTarget::Disabled => Sink::Disabled,
        })
    }

    fn target(&self) -> LogTarget {
        match self {
            Sink::Stderr => LogTarget::Stderr,
            Sink::File { path, .. } => LogTarget::File(path.clone()),
            Sink::Memory(buffer) => LogTarget::Memory(buffer.clone()),
            Sink::Disabled => LogTarget::Disabled,
        }
    }
}

/// Writer handed to the fmt layer; every write goes to the current sink.
#[derive(Clone)]
struct SinkWriter {
    sink: Arc<Mutex<Sink>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *lock(&self.sink) {
            Sink::Stderr => io::stderr().write(buf),
            Sink::File { file, .. } => file.write(buf),
            Sink::Memory(buffer) => {
                lock(&buffer.0).extend_from_slice(buf);
                Ok(buf.len())
            }
            Sink::Disabled => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *lock(&self.sink) {
            Sink::Stderr => io::stderr().flush(),
            Sink::File { file, .. } => file.flush(),
            Sink::Memory(_) | Sink::Disabled => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Logging configuration: current level plus active sink.
pub struct Logging {
    filter: reload::Handle<LevelFilter, Registry>,
    writer: SinkWriter,
    dispatch: Dispatch,
}

impl Logging {
    pub fn new(level: LogLevel, target: LogTarget) -> Result<Self> {
        let (filter_layer, filter) = reload::Layer::new(level.to_level_filter());
        let writer = SinkWriter {
            sink: Arc::new(Mutex::new(Sink::open(target)?)),
        };

        let subscriber = Registry::default().with(filter_layer).with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer.clone())
                .with_ansi(false)
                .with_target(false),
        );

        Ok(Self {
            filter,
            writer,
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn level(&self) -> LogLevel {
        self.filter
            .clone_current()
            .map(LogLevel::from_level_filter)
            .unwrap_or(LogLevel::None)
    }

    pub fn set_level(&self, level: LogLevel) -> Result<()> {
        self.filter
            .modify(|filter| *filter = level.to_level_filter())
            .map_err(|e| DecodeError::Config(format!("Failed to change log level: {e}")))
    }

    pub fn target(&self) -> LogTarget {
        lock(&self.writer.sink).target()
    }

    pub fn set_target(&self, target: LogTarget) -> Result<()> {
        let sink = Sink::open(target)?;
        *lock(&self.writer.sink) = sink;
        Ok(())
    }

    /// Make this the process-wide subscriber. Can only succeed once.
    pub fn install_global(&self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|e| DecodeError::Config(format!("Logging already initialized: {e}")))
    }

    /// Run `f` with this configuration as the thread's subscriber.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}
