//! Run lifecycle controller
//!
//! Sequences one profiling run: optional start delay, the `perf record`
//! recording, then the independent post-processing steps. The delay and the
//! recording race a [`CancellationToken`]; once post-processing starts the
//! run goes to completion.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use perfsnap_shared::utils::time::format_secs;
use perfsnap_shared::{OutputSet, PostStep, RunPhase, RunRequest};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, RunError, EXIT_OK, EXIT_PARTIAL};
use crate::invoker::{stopped_by_request, Invoker, Recording};
use crate::settings::Settings;
use crate::{namer, process};

/// How often the target is checked while perf records it
const LIVENESS_POLL: Duration = Duration::from_millis(250);

/// One recorded phase change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: RunPhase,
    pub to: RunPhase,
    /// Time since the run started
    pub at: Duration,
}

/// Mutable state of a run, owned by the controller
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
    started_at: DateTime<Local>,
    started: Instant,
    last_error: Option<String>,
    history: Vec<PhaseChange>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: RunPhase::Pending,
            started_at: Local::now(),
            started: Instant::now(),
            last_error: None,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn started_at(&self) -> &DateTime<Local> {
        &self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    /// Time at which the run entered `phase`, if it did
    pub fn entered(&self, phase: RunPhase) -> Option<Duration> {
        self.history.iter().find(|c| c.to == phase).map(|c| c.at)
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        let change = PhaseChange {
            from: self.phase,
            to: next,
            at: self.elapsed(),
        };
        info!(from = %change.from, to = %change.to, "Phase transition");
        self.history.push(change);
        self.phase = next;
    }
}

/// Result of one post-processing step
#[derive(Debug)]
pub struct StepReport {
    pub step: PostStep,
    pub path: PathBuf,
    pub error: Option<ExecutionError>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What a completed run produced
#[derive(Debug)]
pub struct RunSummary {
    pub outputs: OutputSet,
    pub steps: Vec<StepReport>,
    /// Time from start to the end of recording
    pub recording_span: Duration,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl RunSummary {
    /// Whether any requested post-processing step failed
    pub fn has_warnings(&self) -> bool {
        self.steps.iter().any(|s| !s.succeeded())
    }

    pub fn exit_code(&self) -> u8 {
        if self.has_warnings() {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }
}

/// Drives a single [`RunRequest`] through its lifecycle
///
/// A controller runs once; build a new one for every run.
pub struct Controller {
    request: RunRequest,
    invoker: Invoker,
    slack: Duration,
    grace: Duration,
    state: RunState,
}

impl Controller {
    pub fn new(request: RunRequest, settings: &Settings) -> Self {
        let invoker = Invoker::new(settings, request.dry_run);
        Self {
            request,
            invoker,
            slack: settings.record_slack(),
            grace: settings.terminate_grace(),
            state: RunState::new(),
        }
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run the lifecycle to a terminal phase
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary, RunError> {
        let result = self.drive(cancel).await;
        if let Err(err) = &result {
            self.finish_with(err);
        }
        result
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<RunSummary, RunError> {
        let outputs = namer::resolve(&self.request, self.state.started_at());
        info!(
            pid = self.request.pid,
            duration = %format_secs(self.request.duration),
            start_delay = %format_secs(self.request.start_delay),
            dry_run = self.request.dry_run,
            raw = %outputs.raw.display(),
            "Starting profiling run"
        );
        debug!(
            "Recording should end {} from now",
            format_secs(self.request.expected_span())
        );

        if !self.request.start_delay.is_zero() {
            self.state.advance(RunPhase::Delaying);
            self.delay(cancel).await?;
        }

        self.state.advance(RunPhase::Recording);
        self.record(&outputs, cancel).await?;
        let recording_span = self.state.elapsed();

        self.state.advance(RunPhase::PostProcessing);
        let steps = self.post_process(&outputs).await;

        self.state.advance(RunPhase::Completed);
        let summary = RunSummary {
            outputs,
            steps,
            recording_span,
            elapsed: self.state.elapsed(),
            dry_run: self.request.dry_run,
        };
        if summary.has_warnings() {
            warn!("Profiling complete with warnings");
        } else {
            info!("Profiling complete");
        }
        Ok(summary)
    }

    async fn delay(&mut self, cancel: &CancellationToken) -> Result<(), RunError> {
        let aborted = RunError::Aborted {
            phase: RunPhase::Delaying,
        };
        if cancel.is_cancelled() {
            return Err(aborted);
        }
        let delay = self.request.start_delay;
        info!("Waiting {} before starting profiling", format_secs(delay));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(aborted),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn record(&mut self, outputs: &OutputSet, cancel: &CancellationToken) -> Result<(), RunError> {
        let pid = self.request.pid;
        let lost = RunError::TargetLost {
            pid,
            phase: RunPhase::Recording,
        };
        if cancel.is_cancelled() {
            return Err(RunError::Aborted {
                phase: RunPhase::Recording,
            });
        }
        if !process::is_alive(pid) {
            return Err(lost);
        }

        let spec = self.invoker.record_command(&self.request, &outputs.raw);
        let mut child = match self.invoker.spawn_recording(&spec)? {
            Recording::Simulated => return Ok(()),
            Recording::Running(child) => child,
        };
        let io_err = |source| RunError::Io {
            phase: RunPhase::Recording,
            path: outputs.raw.clone(),
            source,
        };

        let deadline = tokio::time::sleep(self.request.duration + self.slack);
        tokio::pin!(deadline);
        let mut liveness = tokio::time::interval(LIVENESS_POLL);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut overran = false;

        let status = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Interrupt received; stopping recording");
                    let status = child.terminate(Signal::SIGTERM, self.grace).await.map_err(io_err)?;
                    debug!(%status, "Recording process stopped");
                    return Err(RunError::Aborted { phase: RunPhase::Recording });
                }
                status = child.wait() => break status.map_err(io_err)?,
                _ = &mut deadline => {
                    warn!(
                        "Recording still running {} past its duration; stopping perf",
                        format_secs(self.slack)
                    );
                    overran = true;
                    break child.terminate(Signal::SIGINT, self.grace).await.map_err(io_err)?;
                }
                _ = liveness.tick() => {
                    if !process::is_alive(pid) {
                        warn!(pid, "Target process exited during recording");
                        child.terminate(Signal::SIGTERM, self.grace).await.map_err(io_err)?;
                        return Err(lost);
                    }
                }
            }
        };

        let captured = child.finish(status).await;
        if !captured.stderr.trim().is_empty() {
            debug!("perf record stderr:\n{}", captured.stderr.trim_end());
        }
        if overran && stopped_by_request(status) {
            warn!(%status, "Recording stopped by watchdog");
        } else if let Err(err) = self.invoker.check_recording(&spec, &captured) {
            if !process::is_alive(pid) {
                return Err(lost);
            }
            return Err(err.into());
        }

        if !outputs.raw.exists() {
            warn!(path = %outputs.raw.display(), "perf exited successfully but wrote no recording");
        }
        process::restore_ownership(&outputs.raw);
        info!(path = %outputs.raw.display(), "Recording written");
        Ok(())
    }

    async fn post_process(&mut self, outputs: &OutputSet) -> Vec<StepReport> {
        let mut steps = Vec::new();
        if !self.request.wants_post_processing() {
            debug!("No post-processing requested");
            return steps;
        }
        if self.request.report {
            steps.push(self.run_step(PostStep::Report, outputs).await);
        }
        if self.request.flamegraph {
            steps.push(self.run_step(PostStep::Flamegraph, outputs).await);
        }
        steps
    }

    async fn run_step(&self, step: PostStep, outputs: &OutputSet) -> StepReport {
        let raw = outputs.raw.as_path();
        let path = outputs.for_step(step);
        let spec = match step {
            PostStep::Report => self.invoker.report_command(raw),
            PostStep::Flamegraph => {
                let force = !self.invoker.is_dry_run() && process::needs_force_flag(raw);
                self.invoker.script_command(raw, force)
            }
        };

        let error = match self.invoker.run_to_file(&spec, path).await {
            Ok(captured) => {
                if !captured.stderr.trim().is_empty() {
                    debug!(step = %step, "perf stderr:\n{}", captured.stderr.trim_end());
                }
                if !self.invoker.is_dry_run() {
                    process::restore_ownership(path);
                    info!(step = %step, path = %path.display(), "Output written");
                }
                None
            }
            Err(err) => {
                warn!(step = %step, "Post-processing step failed: {}", err);
                Some(err)
            }
        };
        StepReport {
            step,
            path: path.to_path_buf(),
            error,
        }
    }

    fn finish_with(&mut self, err: &RunError) {
        let from = self.state.phase();
        self.state.last_error = Some(err.to_string());
        if err.is_aborted() && from.is_cancellable() {
            self.state.advance(RunPhase::Aborted);
            warn!(phase = %from, "Run aborted: {}", err);
        } else if !from.is_terminal() {
            self.state.advance(RunPhase::Failed);
            error!(phase = %from, "Run failed: {}", err);
        }
    }
}
