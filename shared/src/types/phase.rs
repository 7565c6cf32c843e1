//! Run lifecycle phases

use std::fmt;

/// Phase of a profiling run
///
/// `Pending -> Delaying -> Recording -> PostProcessing -> Completed`, with
/// `Failed` reachable from any non-terminal phase and `Aborted` reachable
/// from `Delaying` or `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    Pending,
    Delaying,
    Recording,
    PostProcessing,
    Completed,
    Failed,
    Aborted,
}

impl RunPhase {
    /// Whether the run has finished in this phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Whether an interrupt in this phase aborts the run
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Delaying | Self::Recording)
    }

    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;

        match (self, next) {
            (Pending, Delaying) | (Pending, Recording) => true,
            (Delaying, Recording) => true,
            (Recording, PostProcessing) => true,
            (PostProcessing, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            (from, Aborted) => from.is_cancellable(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delaying => "delaying",
            Self::Recording => "recording",
            Self::PostProcessing => "post-processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent post-processing step run after a successful recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostStep {
    /// `perf report --stdio` text
    Report,

    /// `perf script` stack dump for flamegraph tooling
    Flamegraph,
}

impl PostStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Flamegraph => "flamegraph",
        }
    }
}

impl fmt::Display for PostStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
