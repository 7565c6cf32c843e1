//! Runner settings
//!
//! Layered from built-in defaults, an optional TOML file and `PERFSNAP_*`
//! environment variables. Command-line flags override all of these.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use perfsnap_shared::DEFAULT_PERF_OPTS;
use serde::Deserialize;

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "PERFSNAP";

/// Runner settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Executable used for every perf subcommand
    pub perf_binary: PathBuf,

    /// Options forwarded to `perf record` when `--perf-opts` is omitted
    pub perf_opts: String,

    /// Directory for auto-named output files
    pub output_dir: PathBuf,

    /// How far past the requested duration a recording may run before it is stopped
    pub record_slack_secs: u64,

    /// Grace period between a polite signal and SIGKILL
    pub terminate_grace_secs: u64,

    /// Refuse to record when perf_event_paranoid would block a non-root user
    pub check_perf_access: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            perf_binary: PathBuf::from("perf"),
            perf_opts: DEFAULT_PERF_OPTS.to_string(),
            output_dir: PathBuf::from("."),
            record_slack_secs: 1,
            terminate_grace_secs: 3,
            check_perf_access: true,
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn record_slack(&self) -> Duration {
        Duration::from_secs(self.record_slack_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.terminate_grace_secs)
    }
}
