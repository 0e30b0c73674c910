//! Logging through `tracing` and `tracing-subscriber`.
//!
//! The terminal UI owns stdout and stderr while it runs, so events are written
//! to a log file. `RUST_LOG` overrides the configured level.
//!
//! - `warn`: rejected user actions, history write failures
//! - `info`: session milestones (lock-in, focus start/end, saved recaps)
//! - `debug`: every dispatched action, rejected programmatic actions, timers

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::{fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_dirs::AppDirs;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// When `None` logging is disabled.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_file: AppDirs::log_path(),
        }
    }
}

impl LogConfig {
    /// - 0: info
    /// - 1 (`-v`): debug
    /// - 2+ (`-vv`): trace
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }
}

/// Installs the global subscriber. Call once at startup.
///
/// # Errors
///
/// Returns an error if the log file or its directory cannot be created.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let layer = fmt::layer()
        .with_writer(SharedFileWriter::new(file))
        .with_ansi(false)
        .with_target(false);

    // a second call (tests, embedders) keeps the subscriber already installed
    if let Err(err) = tracing_subscriber::registry()
        .with(build_env_filter(config.level))
        .with(layer)
        .try_init()
    {
        tracing::debug!(%err, "global subscriber already installed, keeping it");
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,lockin={level}",
            level = level.as_str().to_lowercase()
        ))
    })
}

#[derive(Clone)]
struct SharedFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl SharedFileWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

struct SharedFileGuard {
    file: Arc<Mutex<std::fs::File>>,
}

impl io::Write for SharedFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        guard.flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard {
            file: Arc::clone(&self.file),
        }
    }
}
