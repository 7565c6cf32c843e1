//! Validated run configuration
//!
//! A `RunRequest` is captured once from validated command-line input and is
//! never mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

/// Process ID
pub type Pid = i32;

/// Default options forwarded to `perf record` when none are given
pub const DEFAULT_PERF_OPTS: &str = "-e cpu-clock:pp";

/// Output paths supplied explicitly by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputOverrides {
    /// Raw recording path (`--output`)
    pub raw: Option<PathBuf>,

    /// Report text path (`--report-file`)
    pub report: Option<PathBuf>,

    /// Flamegraph stack dump path (`--flamegraph-file`)
    pub flamegraph: Option<PathBuf>,
}

/// Immutable configuration for a single profiling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Target process ID
    pub pid: Pid,

    /// Recording length
    pub duration: Duration,

    /// Wait before recording starts
    pub start_delay: Duration,

    /// Options forwarded verbatim to `perf record`
    pub perf_opts: Vec<String>,

    /// Explicit output paths
    pub overrides: OutputOverrides,

    /// Directory for auto-named outputs
    pub output_dir: PathBuf,

    /// Generate a `perf report` after recording
    pub report: bool,

    /// Generate a `perf script` stack dump after recording
    pub flamegraph: bool,

    /// Walk the lifecycle without spawning anything
    pub dry_run: bool,

    /// Verbose logging
    pub verbose: bool,

    /// Optional log file destination
    pub logfile: Option<PathBuf>,
}

impl RunRequest {
    /// Total wall-clock time the run is expected to spend before post-processing
    pub fn expected_span(&self) -> Duration {
        self.start_delay + self.duration
    }

    /// Whether any post-processing step was requested
    pub fn wants_post_processing(&self) -> bool {
        self.report || self.flamegraph
    }
}
