//! Logging setup
//!
//! One subscriber is built per process and installed as the scoped default
//! dispatcher. Dropping the returned [`LogGuard`] uninstalls it and closes
//! the log file.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::error::{Field, ValidationError};

/// Logger configuration
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Log at debug level instead of info
    pub verbose: bool,

    /// Also append log lines to this file
    pub logfile: Option<PathBuf>,
}

/// Keeps the logger installed; drop it to flush and release the log file
#[must_use = "logging stops when the guard is dropped"]
pub struct LogGuard {
    _default: DefaultGuard,
}

/// Install console (stderr) and optional file logging
pub fn init(opts: &LogOptions) -> Result<LogGuard, ValidationError> {
    let level = if opts.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match &opts.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ValidationError::new(
                        Field::Logfile,
                        format!("cannot open {}: {}", path.display(), e),
                    )
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer);

    Ok(LogGuard {
        _default: tracing::subscriber::set_default(subscriber),
    })
}
