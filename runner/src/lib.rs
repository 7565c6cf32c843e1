//! perfsnap runner library
//!
//! Validates a profiling request, names its outputs and drives `perf record`
//! plus optional `perf report` / `perf script` post-processing through a
//! cancellable run lifecycle.

pub mod error;
pub mod invoker;
pub mod lifecycle;
pub mod logging;
pub mod namer;
pub mod process;
pub mod settings;
pub mod validate;

pub use error::{ExecutionError, Field, RunError, ValidationError};
pub use lifecycle::{Controller, RunState, RunSummary, StepReport};
pub use settings::Settings;
pub use validate::{RawOptions, Validator};

use tokio_util::sync::CancellationToken;
use perfsnap_shared::RunPhase;
use tracing::{error, info};

/// Validate `raw` and run it to completion
pub async fn run_once(
    settings: &Settings,
    raw: &RawOptions,
    cancel: &CancellationToken,
) -> Result<RunSummary, RunError> {
    let request = Validator::new(settings).validate(raw).inspect_err(|e| {
        error!(phase = %RunPhase::Pending, "Validation failed: {}", e);
    })?;
    if request.dry_run {
        info!("Dry run: perf will not be invoked and no data files will be written");
    }
    Controller::new(request, settings).run(cancel).await
}
