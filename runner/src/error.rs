//! Error taxonomy for a profiling run and its process exit codes

use std::fmt;
use std::io;
use std::path::PathBuf;

use perfsnap_shared::{Pid, RunPhase};
use thiserror::Error;

/// Run finished and every requested step succeeded
pub const EXIT_OK: u8 = 0;
/// Configuration or internal failure outside the run lifecycle
pub const EXIT_INTERNAL: u8 = 1;
pub const EXIT_VALIDATION: u8 = 2;
/// `perf record` failed to launch or exited non-zero
pub const EXIT_EXECUTION: u8 = 3;
pub const EXIT_TARGET_LOST: u8 = 4;
/// Recording succeeded but at least one post-processing step failed
pub const EXIT_PARTIAL: u8 = 5;
/// Conventional 128 + SIGINT
pub const EXIT_ABORTED: u8 = 130;

/// Input that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pid,
    Duration,
    StartDelay,
    PerfOpts,
    Output,
    ReportFile,
    FlamegraphFile,
    OutputDir,
    Logfile,
    PerfAccess,
}

impl Field {
    /// Command-line spelling of the field
    pub fn flag(self) -> &'static str {
        match self {
            Self::Pid => "--pid",
            Self::Duration => "--duration",
            Self::StartDelay => "--start-delay",
            Self::PerfOpts => "--perf-opts",
            Self::Output => "--output",
            Self::ReportFile => "--report-file",
            Self::FlamegraphFile => "--flamegraph-file",
            Self::OutputDir => "output_dir",
            Self::Logfile => "--logfile",
            Self::PerfAccess => "perf access",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// Malformed or unsatisfiable input, reported before anything is spawned
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: Field,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// How an external command failed
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionFailure {
    /// The command could not be started (not found, permission denied, ...)
    #[error("failed to launch: {0}")]
    Launch(#[source] io::Error),

    /// The command ran and exited unsuccessfully
    #[error("{}", describe_exit(.status, .stderr))]
    Exit { status: Option<i32>, stderr: String },

    /// The command could not be waited on or its output could not be written
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
}

fn describe_exit(status: &Option<i32>, stderr: &str) -> String {
    let status = match status {
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{status}: {stderr}")
    }
}

/// An external command failed during a given phase
#[derive(Debug, Error)]
#[error("{phase} `{command}` {failure}")]
pub struct ExecutionError {
    pub phase: RunPhase,
    pub command: String,
    #[source]
    pub failure: ExecutionFailure,
}

impl ExecutionError {
    /// Exit status of the command, if it ran to completion
    pub fn status(&self) -> Option<i32> {
        match &self.failure {
            ExecutionFailure::Exit { status, .. } => *status,
            _ => None,
        }
    }

    /// Captured standard error, if the command ran
    pub fn stderr(&self) -> Option<&str> {
        match &self.failure {
            ExecutionFailure::Exit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Fatal outcome of a profiling run
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("target process {pid} exited while {phase}")]
    TargetLost { pid: Pid, phase: RunPhase },

    #[error("interrupted while {phase}")]
    Aborted { phase: RunPhase },

    #[error("{phase}: i/o error on {}: {source}", .path.display())]
    Io {
        phase: RunPhase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// Phase the controller was in when the error surfaced
    pub fn phase(&self) -> RunPhase {
        match self {
            Self::Validation(_) => RunPhase::Pending,
            Self::Execution(e) => e.phase,
            Self::TargetLost { phase, .. } | Self::Aborted { phase } | Self::Io { phase, .. } => {
                *phase
            }
        }
    }

    /// Distinct process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => EXIT_VALIDATION,
            Self::Execution(_) | Self::Io { .. } => EXIT_EXECUTION,
            Self::TargetLost { .. } => EXIT_TARGET_LOST,
            Self::Aborted { .. } => EXIT_ABORTED,
        }
    }

    /// Whether the run ended because of a user interrupt
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_flag() {
        let err = ValidationError::new(Field::Duration, "must be greater than 0");
        assert_eq!(err.to_string(), "invalid --duration: must be greater than 0");
    }

    #[test]
    fn test_execution_message_includes_status_and_stderr() {
        let err = ExecutionError {
            phase: RunPhase::Recording,
            command: "perf record -p 1".to_string(),
            failure: ExecutionFailure::Exit {
                status: Some(255),
                stderr: "No such process\n".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "recording `perf record -p 1` exited with status 255: No such process"
        );
        assert_eq!(err.status(), Some(255));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            RunError::from(ValidationError::new(Field::Pid, "x")).exit_code(),
            RunError::Execution(ExecutionError {
                phase: RunPhase::Recording,
                command: "perf".to_string(),
                failure: ExecutionFailure::Launch(io::Error::from(io::ErrorKind::NotFound)),
            })
            .exit_code(),
            RunError::TargetLost {
                pid: 1,
                phase: RunPhase::Recording,
            }
            .exit_code(),
            RunError::Aborted {
                phase: RunPhase::Delaying,
            }
            .exit_code(),
            EXIT_PARTIAL,
            EXIT_OK,
        ];
        let mut unique = codes.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_phase_context() {
        let err = RunError::Aborted {
            phase: RunPhase::Recording,
        };
        assert_eq!(err.phase(), RunPhase::Recording);
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "interrupted while recording");
    }
}
