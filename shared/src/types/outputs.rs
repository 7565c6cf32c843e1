//! Resolved output paths for one run

use std::path::{Path, PathBuf};

use super::phase::PostStep;

/// The three file paths a run may produce
///
/// Auto-named paths share one timestamp (and disambiguator, if any); explicit
/// paths are used as given and overwriting them is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSet {
    /// Raw `perf.data` recording
    pub raw: PathBuf,

    /// `perf report` text
    pub report: PathBuf,

    /// `perf script` stack dump
    pub flamegraph: PathBuf,

    /// Timestamp stem shared by the auto-named paths, e.g. `20261019_143005`
    pub stamp: String,
}

impl OutputSet {
    /// Output path for a post-processing step
    pub fn for_step(&self, step: PostStep) -> &Path {
        match step {
            PostStep::Report => &self.report,
            PostStep::Flamegraph => &self.flamegraph,
        }
    }
}
