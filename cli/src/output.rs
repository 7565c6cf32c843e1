//! User-facing status lines
//!
//! Logs go through `tracing`; these are the short coloured lines a user reads
//! at the end of a run. Fatal diagnostics go to stderr.

use colored::Colorize;
use perfsnap_runner::{RunError, RunSummary};
use perfsnap_shared::utils::time::format_secs;

fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

fn detail(label: &str, value: &str) {
    println!("  {} {}", format!("{label}:").dimmed(), value);
}

/// Describe a finished run and the files it produced
pub fn summary(summary: &RunSummary) {
    let elapsed = format_secs(summary.elapsed);
    if summary.dry_run {
        success(&format!("Dry run complete in {elapsed}; no data files written"));
        detail("would record", &summary.outputs.raw.display().to_string());
        for step in &summary.steps {
            detail(&format!("would write {}", step.step), &step.path.display().to_string());
        }
        return;
    }

    if summary.has_warnings() {
        warning(&format!("Profiling complete with warnings in {elapsed}"));
    } else {
        success(&format!("Profiling complete in {elapsed}"));
    }
    detail("recording", &summary.outputs.raw.display().to_string());
    for step in &summary.steps {
        match &step.error {
            None => detail(step.step.as_str(), &step.path.display().to_string()),
            Some(err) => warning(&format!("{} not produced: {}", step.step, err)),
        }
    }
}

/// Report a run that ended before completing
pub fn failure(err: &RunError) {
    match err {
        RunError::Aborted { .. } => warning("Interrupted by user. Exiting cleanly."),
        RunError::TargetLost { .. } => {
            error(&format!("{err}"));
            eprintln!("  the target process, not perf, ended the run");
        }
        _ => error(&format!("{err}")),
    }
}
