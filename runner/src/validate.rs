//! Option validation
//!
//! Turns raw command-line values into a [`RunRequest`], failing on the first
//! offending field. Apart from the PID liveness probe nothing here touches
//! the system.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{access, AccessFlags};
use perfsnap_shared::{OutputOverrides, Pid, RunRequest};
use tracing::debug;

use crate::error::{Field, ValidationError};
use crate::process;
use crate::settings::Settings;

/// Command-line values before validation
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    pub pid: i64,
    pub duration: i64,
    pub start_delay: i64,
    pub perf_opts: Option<String>,
    pub output: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
    pub flamegraph_file: Option<PathBuf>,
    pub report: bool,
    pub flamegraph: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub logfile: Option<PathBuf>,
}

/// Validates raw options against the current settings
pub struct Validator<'a> {
    settings: &'a Settings,
}

impl<'a> Validator<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Produce a validated request or the first validation failure
    pub fn validate(&self, raw: &RawOptions) -> Result<RunRequest, ValidationError> {
        let pid = validate_pid(raw.pid)?;
        let duration = validate_duration(raw.duration)?;
        let start_delay = validate_start_delay(raw.start_delay)?;
        let perf_opts = validate_perf_opts(raw.perf_opts.as_deref(), &self.settings.perf_opts)?;

        let overrides = OutputOverrides {
            raw: raw.output.clone(),
            report: raw.report_file.clone(),
            flamegraph: raw.flamegraph_file.clone(),
        };
        for (path, field) in [
            (&overrides.raw, Field::Output),
            (&overrides.report, Field::ReportFile),
            (&overrides.flamegraph, Field::FlamegraphFile),
        ] {
            if let Some(path) = path {
                check_writable_file(path, field)?;
            }
        }

        let needs_auto_names = overrides.raw.is_none()
            || (raw.report && overrides.report.is_none())
            || (raw.flamegraph && overrides.flamegraph.is_none());
        if needs_auto_names {
            check_writable_dir(&self.settings.output_dir, Field::OutputDir)?;
        }

        if !raw.dry_run && self.settings.check_perf_access {
            check_perf_access()?;
        }

        let request = RunRequest {
            pid,
            duration,
            start_delay,
            perf_opts,
            overrides,
            output_dir: self.settings.output_dir.clone(),
            report: raw.report,
            flamegraph: raw.flamegraph,
            dry_run: raw.dry_run,
            verbose: raw.verbose,
            logfile: raw.logfile.clone(),
        };
        debug!(?request, "Validated run request");
        Ok(request)
    }
}

fn validate_pid(raw: i64) -> Result<Pid, ValidationError> {
    let pid = Pid::try_from(raw)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| ValidationError::new(Field::Pid, format!("{raw} is not a positive process ID")))?;
    if !process::is_alive(pid) {
        return Err(ValidationError::new(
            Field::Pid,
            format!("PID {pid} is not valid or not running"),
        ));
    }
    Ok(pid)
}

fn validate_duration(raw: i64) -> Result<Duration, ValidationError> {
    u64::try_from(raw)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ValidationError::new(Field::Duration, format!("must be greater than 0, got {raw}")))
}

fn validate_start_delay(raw: i64) -> Result<Duration, ValidationError> {
    u64::try_from(raw)
        .map(Duration::from_secs)
        .map_err(|_| ValidationError::new(Field::StartDelay, format!("must not be negative, got {raw}")))
}

/// Split perf options on whitespace; the tokens themselves are passed through untouched
fn validate_perf_opts(raw: Option<&str>, fallback: &str) -> Result<Vec<String>, ValidationError> {
    let (opts, field_msg) = match raw {
        Some(opts) => (opts, "must not be empty"),
        None => (fallback, "configured default is empty"),
    };
    let tokens: Vec<String> = opts.split_whitespace().map(str::to_string).collect();
    if tokens.is_empty() {
        return Err(ValidationError::new(Field::PerfOpts, field_msg));
    }
    Ok(tokens)
}

fn check_writable_file(path: &Path, field: Field) -> Result<(), ValidationError> {
    if path.is_dir() {
        return Err(ValidationError::new(
            field,
            format!("{} is a directory", path.display()),
        ));
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    check_writable_dir(parent, field)
}

fn check_writable_dir(dir: &Path, field: Field) -> Result<(), ValidationError> {
    if !dir.is_dir() {
        return Err(ValidationError::new(
            field,
            format!("directory {} does not exist", dir.display()),
        ));
    }
    access(dir, AccessFlags::W_OK).map_err(|e| {
        ValidationError::new(field, format!("directory {} is not writable: {}", dir.display(), e))
    })
}

/// Require root or `perf_event_paranoid == -1`
///
/// Not called for dry runs: they never start perf, so a command line can be
/// rehearsed without privileges.
fn check_perf_access() -> Result<(), ValidationError> {
    let paranoid = process::perf_event_paranoid()
        .map_err(|e| ValidationError::new(Field::PerfAccess, format!("perf access check failed: {e}")))?;
    if !process::perf_access_allowed(paranoid, process::is_root()) {
        return Err(ValidationError::new(
            Field::PerfAccess,
            format!(
                "root privileges required unless perf_event_paranoid is set to -1 (currently {paranoid})"
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path) -> Settings {
        Settings {
            output_dir: dir.to_path_buf(),
            check_perf_access: false,
            ..Settings::default()
        }
    }

    fn raw() -> RawOptions {
        RawOptions {
            pid: std::process::id() as i64,
            duration: 5,
            ..RawOptions::default()
        }
    }

    fn field_of(result: Result<RunRequest, ValidationError>) -> Field {
        result.unwrap_err().field
    }

    #[test]
    fn test_valid_request_uses_default_perf_opts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let request = Validator::new(&settings).validate(&raw()).unwrap();

        assert_eq!(request.pid, std::process::id() as Pid);
        assert_eq!(request.duration, Duration::from_secs(5));
        assert_eq!(request.start_delay, Duration::ZERO);
        assert_eq!(request.perf_opts, vec!["-e", "cpu-clock:pp"]);
        assert_eq!(request.output_dir, dir.path());
    }

    #[test]
    fn test_perf_opts_forwarded_as_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            perf_opts: Some("-F 999  -g --call-graph dwarf".to_string()),
            ..raw()
        };
        let request = Validator::new(&settings).validate(&options).unwrap();
        assert_eq!(request.perf_opts, vec!["-F", "999", "-g", "--call-graph", "dwarf"]);
    }

    #[test]
    fn test_rejects_non_positive_pid() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let validator = Validator::new(&settings);

        for pid in [0, -4, i64::from(i32::MAX) + 1] {
            let options = RawOptions { pid, ..raw() };
            assert_eq!(field_of(validator.validate(&options)), Field::Pid);
        }
    }

    #[test]
    fn test_rejects_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i64;
        child.wait().unwrap();

        let err = Validator::new(&settings)
            .validate(&RawOptions { pid, ..raw() })
            .unwrap_err();
        assert_eq!(err.field, Field::Pid);
        assert!(err.message.contains("not valid or not running"));
    }

    #[test]
    fn test_rejects_zero_and_negative_duration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let validator = Validator::new(&settings);

        for duration in [0, -1] {
            let options = RawOptions { duration, ..raw() };
            assert_eq!(field_of(validator.validate(&options)), Field::Duration);
        }
    }

    #[test]
    fn test_rejects_negative_start_delay() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            start_delay: -3,
            ..raw()
        };
        assert_eq!(
            field_of(Validator::new(&settings).validate(&options)),
            Field::StartDelay
        );
    }

    #[test]
    fn test_rejects_blank_perf_opts() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            perf_opts: Some("   ".to_string()),
            ..raw()
        };
        assert_eq!(
            field_of(Validator::new(&settings).validate(&options)),
            Field::PerfOpts
        );
    }

    #[test]
    fn test_first_offending_field_wins() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            pid: 0,
            duration: 0,
            start_delay: -1,
            ..raw()
        };
        assert_eq!(field_of(Validator::new(&settings).validate(&options)), Field::Pid);
    }

    #[test]
    fn test_rejects_output_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            output: Some(dir.path().join("missing").join("perf.data")),
            ..raw()
        };
        assert_eq!(
            field_of(Validator::new(&settings).validate(&options)),
            Field::Output
        );
    }

    #[test]
    fn test_rejects_report_file_that_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            report: true,
            report_file: Some(dir.path().to_path_buf()),
            ..raw()
        };
        assert_eq!(
            field_of(Validator::new(&settings).validate(&options)),
            Field::ReportFile
        );
    }

    #[test]
    fn test_output_dir_only_checked_when_auto_naming() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir.path().join("nope"));
        let validator = Validator::new(&settings);

        assert_eq!(field_of(validator.validate(&raw())), Field::OutputDir);

        let explicit = RawOptions {
            output: Some(dir.path().join("perf.data")),
            ..raw()
        };
        assert!(validator.validate(&explicit).is_ok());
    }

    #[test]
    fn test_dry_run_skips_perf_access_check() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            check_perf_access: true,
            ..settings(dir.path())
        };
        let opts = RawOptions {
            dry_run: true,
            ..raw()
        };
        let request = Validator::new(&settings).validate(&opts).unwrap();
        assert!(request.dry_run);
    }

    #[test]
    fn test_validation_creates_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let options = RawOptions {
            report: true,
            flamegraph: true,
            ..raw()
        };
        Validator::new(&settings).validate(&options).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
