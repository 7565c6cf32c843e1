//! External process invocation
//!
//! Builds `perf record`/`report`/`script` command lines and runs them. In dry
//! run mode every command is logged and reported as a success without
//! spawning anything.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid as NixPid;
use perfsnap_shared::utils::{command_line, time::format_secs};
use perfsnap_shared::{RunPhase, RunRequest};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, ExecutionFailure};
use crate::settings::Settings;

/// How long to wait for a finished child's output pipes to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A fully specified external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Phase the command belongs to
    pub phase: RunPhase,
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    fn new(phase: RunPhase, program: &Path) -> Self {
        Self {
            phase,
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        command_line(self.program.as_os_str(), &self.args)
    }

    fn error(&self, failure: ExecutionFailure) -> ExecutionError {
        ExecutionError {
            phase: self.phase,
            command: self.display(),
            failure,
        }
    }
}

/// Exit status and output of a finished command
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    fn simulated() -> Self {
        Self {
            status: ExitStatus::from_raw(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// A recording started by [`Invoker::spawn_recording`]
pub enum Recording {
    /// Dry run: nothing was spawned
    Simulated,
    Running(RunningChild),
}

/// A spawned recording process leading its own process group
pub struct RunningChild {
    child: Child,
    pgid: Option<NixPid>,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

impl RunningChild {
    /// OS process ID of the child, if it has not been reaped yet
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the child to exit. Cancel safe.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Send `signal` to the child's whole process group
    pub fn signal(&self, signal: Signal) {
        let Some(pgid) = self.pgid else {
            return;
        };
        match killpg(pgid, signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pgid, e),
        }
    }

    /// Stop the child: `signal`, then SIGKILL once `grace` runs out
    ///
    /// Always reaps the child and sweeps any process left in its group.
    pub async fn terminate(&mut self, signal: Signal, grace: Duration) -> io::Result<ExitStatus> {
        debug!(pid = ?self.id(), "Sending {} to recording process group", signal);
        self.signal(signal);
        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "Recording process did not exit within {}; killing it",
                    format_secs(grace)
                );
                self.signal(Signal::SIGKILL);
                self.child.wait().await?
            }
        };
        self.signal(Signal::SIGKILL);
        Ok(status)
    }

    /// Collect captured output once the child has exited
    pub async fn finish(self, status: ExitStatus) -> Captured {
        Captured {
            status,
            stdout: drain(self.stdout).await,
            stderr: drain(self.stderr).await,
        }
    }
}

async fn drain(task: JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            debug!("Timed out draining child output");
            String::new()
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut buf = Vec::new();
            if pipe.read_to_end(&mut buf).await.is_ok() {
                text = String::from_utf8_lossy(&buf).into_owned();
            }
        }
        text
    })
}

/// Runs perf subcommands, or pretends to in dry run mode
#[derive(Debug, Clone)]
pub struct Invoker {
    perf: PathBuf,
    dry_run: bool,
}

impl Invoker {
    pub fn new(settings: &Settings, dry_run: bool) -> Self {
        Self {
            perf: settings.perf_binary.clone(),
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// `perf record <opts> -p <pid> -o <raw> -- sleep <duration>`
    ///
    /// The `sleep` workload is perf's own timer: recording stops when it exits.
    pub fn record_command(&self, request: &RunRequest, raw: &Path) -> CommandSpec {
        CommandSpec::new(RunPhase::Recording, &self.perf)
            .arg("record")
            .args(&request.perf_opts)
            .arg("-p")
            .arg(request.pid.to_string())
            .arg("-o")
            .arg(raw)
            .arg("--")
            .arg("sleep")
            .arg(request.duration.as_secs().to_string())
    }

    /// `perf report -i <raw> --stdio -f`
    pub fn report_command(&self, raw: &Path) -> CommandSpec {
        CommandSpec::new(RunPhase::PostProcessing, &self.perf)
            .arg("report")
            .arg("-i")
            .arg(raw)
            .args(["--stdio", "-f"])
    }

    /// `perf script -i <raw> [-f]`
    pub fn script_command(&self, raw: &Path, force: bool) -> CommandSpec {
        let spec = CommandSpec::new(RunPhase::PostProcessing, &self.perf)
            .arg("script")
            .arg("-i")
            .arg(raw);
        if force {
            spec.arg("-f")
        } else {
            spec
        }
    }

    /// Start a recording in its own process group
    pub fn spawn_recording(&self, spec: &CommandSpec) -> Result<Recording, ExecutionError> {
        if self.dry_run {
            info!(command = %spec.display(), "Dry run: would start recording");
            return Ok(Recording::Simulated);
        }
        info!(command = %spec.display(), "Starting recording");

        let mut std_cmd = std::process::Command::new(&spec.program);
        std_cmd
            .args(&spec.args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| spec.error(ExecutionFailure::Launch(e)))?;
        let pgid = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .map(NixPid::from_raw);
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        Ok(Recording::Running(RunningChild {
            child,
            pgid,
            stdout,
            stderr,
        }))
    }

    /// Run `spec` to completion with its standard output written to `out`
    ///
    /// On failure the partially written `out` is removed.
    pub async fn run_to_file(&self, spec: &CommandSpec, out: &Path) -> Result<Captured, ExecutionError> {
        if self.dry_run {
            info!(command = %spec.display(), output = %out.display(), "Dry run: would run");
            return Ok(Captured::simulated());
        }
        info!(command = %spec.display(), output = %out.display(), "Running");

        let file = File::create(out).map_err(|e| spec.error(ExecutionFailure::Io(e)))?;
        let result = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let outcome = match result {
            Err(e) => Err(spec.error(ExecutionFailure::Launch(e))),
            Ok(output) if !output.status.success() => Err(spec.error(ExecutionFailure::Exit {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })),
            Ok(output) => Ok(Captured {
                status: output.status,
                stdout: String::new(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
        };

        if outcome.is_err() {
            if let Err(e) = fs::remove_file(out) {
                debug!(path = %out.display(), "Failed to remove partial output: {}", e);
            }
        }
        outcome
    }

    /// Turn a finished recording into success or an execution error
    pub fn check_recording(&self, spec: &CommandSpec, captured: &Captured) -> Result<(), ExecutionError> {
        if captured.status.success() {
            return Ok(());
        }
        Err(spec.error(ExecutionFailure::Exit {
            status: captured.status.code(),
            stderr: captured.stderr.clone(),
        }))
    }
}

/// Whether a child that was asked to stop exited because of that request
pub fn stopped_by_request(status: ExitStatus) -> bool {
    status.success()
        || matches!(
            status.signal().and_then(|s| Signal::try_from(s).ok()),
            Some(Signal::SIGINT) | Some(Signal::SIGTERM)
        )
}
