//! Process-wide logging setup on top of `tracing-subscriber`.
//!
//! Level names follow the proxy's configuration vocabulary (`critical`,
//! `message`, ...) and map onto `tracing` levels. A `RUST_LOG` environment
//! filter, when present, overrides the configured level.
//!
//! File output can be reopened through the returned [`LogHandle`], so an
//! external rotation tool can move the file away and signal the proxy.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use sqlproxy_error::{ProxyError, Result};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Minimum severity that gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Error,
    #[default]
    Critical,
    Warning,
    Message,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Message => "message",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// The `tracing` level this name stands for. `critical` has no
    /// counterpart and folds into `ERROR`, `message` into `INFO`.
    pub const fn tracing_level(self) -> Level {
        match self {
            Self::Error | Self::Critical => Level::ERROR,
            Self::Warning => Level::WARN,
            Self::Message | Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    fn filter_directive(self) -> &'static str {
        match self {
            Self::Error | Self::Critical => "error",
            Self::Warning => "warn",
            Self::Message | Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "warning" | "warn" => Ok(Self::Warning),
            "message" => Ok(Self::Message),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(ProxyError::Config(format!(
                "unknown log level '{s}' (expected error, critical, warning, message, info, debug or trace)"
            ))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ProxyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_owned()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
    /// Colour output; ignored when logging to a file.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            file: None,
            ansi: true,
        }
    }
}

/// Append-mode log file that can be swapped for a fresh one at the same path.
#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(open_append(path)?),
        })
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| ProxyError::Config(format!("cannot open log file {}: {err}", path.display())))
}

/// [`MakeWriter`] over a shared [`LogFile`]; each event holds the lock while
/// it is written.
#[derive(Debug, Clone)]
struct SharedLogFile(Arc<LogFile>);

struct LogFileWriter<'a>(MutexGuard<'a, File>);

impl Write for LogFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedLogFile {
    type Writer = LogFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(self.0.lock())
    }
}

/// Handle on the installed logging output.
#[derive(Debug, Clone, Default)]
pub struct LogHandle {
    file: Option<Arc<LogFile>>,
}

impl LogHandle {
    /// The file being logged to, `None` when logging to stderr.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref().map(|file| file.path.as_path())
    }

    /// Reopen the log file at its configured path, e.g. after logrotate
    /// renamed it. A no-op when logging to stderr. On failure the old file
    /// stays in use.
    pub fn reopen(&self) -> Result<()> {
        let Some(log) = self.file.as_deref() else {
            return Ok(());
        };
        let fresh = open_append(&log.path)?;
        *log.lock() = fresh;
        tracing::info!(file = %log.path.display(), "log file reopened");
        Ok(())
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.filter_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let (installed, handle) = match &config.file {
        Some(path) => {
            let log = Arc::new(LogFile::open(path)?);
            let installed = builder
                .with_ansi(false)
                .with_writer(SharedLogFile(Arc::clone(&log)))
                .try_init();
            (installed, LogHandle { file: Some(log) })
        }
        None => {
            let installed = builder
                .with_ansi(config.ansi)
                .with_writer(io::stderr)
                .try_init();
            (installed, LogHandle::default())
        }
    };
    installed.map_err(|err| ProxyError::Config(format!("logging already initialised: {err}")))?;

    tracing::debug!(level = %config.level, file = ?config.file, "logging initialised");
    Ok(handle)
}
