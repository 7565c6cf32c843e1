//! perfsnap CLI
//!
//! Wraps `perf record` to take a timed, optionally delayed snapshot of a
//! running process, then post-processes the recording into a report and/or
//! a flamegraph stack dump.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use perfsnap_runner::error::{EXIT_ABORTED, EXIT_INTERNAL, EXIT_VALIDATION};
use perfsnap_runner::logging::{self, LogOptions};
use perfsnap_runner::Settings;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod args;
mod output;

use args::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    ExitCode::from(run(cli).await)
}

async fn run(cli: Cli) -> u8 {
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            output::error(&format!("{e:#}"));
            return EXIT_INTERNAL;
        }
    };

    let _log = match logging::init(&LogOptions {
        verbose: cli.verbose,
        logfile: cli.logfile.clone(),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            output::error(&e.to_string());
            return EXIT_VALIDATION;
        }
    };

    info!("Starting perfsnap");
    let cancel = CancellationToken::new();
    if let Err(e) = listen_for_signals(cancel.clone()) {
        output::error(&format!("{e:#}"));
        return EXIT_INTERNAL;
    }

    let raw = cli.raw_options();
    loop {
        let code = match perfsnap_runner::run_once(&settings, &raw, &cancel).await {
            Ok(summary) => {
                output::summary(&summary);
                summary.exit_code()
            }
            Err(err) => {
                output::failure(&err);
                return err.exit_code();
            }
        };

        if !cli.interactive {
            return code;
        }
        match ask_run_again(&cancel).await {
            Some(true) => info!("Starting another run"),
            Some(false) => {
                output::info("Exiting perfsnap.");
                return code;
            }
            None => {
                warn!("Interrupted at prompt");
                return EXIT_ABORTED;
            }
        }
    }
}

/// Cancel `token` on the first SIGINT or SIGTERM
fn listen_for_signals(token: CancellationToken) -> Result<()> {
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => warn!("Received SIGINT"),
            _ = terminate.recv() => warn!("Received SIGTERM"),
        }
        token.cancel();
    });
    Ok(())
}

/// Prompt for another run; `None` if interrupted first
///
/// Stdin is read on a detached thread so an interrupt does not wait for a
/// line of input.
async fn ask_run_again(cancel: &CancellationToken) -> Option<bool> {
    print!("\nRun again? [y/N]: ");
    let _ = std::io::stdout().flush();

    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let answer = std::io::stdin().read_line(&mut line).is_ok()
            && line.trim().eq_ignore_ascii_case("y");
        let _ = tx.send(answer);
    });

    tokio::select! {
        _ = cancel.cancelled() => None,
        answer = rx => Some(answer.unwrap_or(false)),
    }
}
