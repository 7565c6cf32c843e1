//! Output file naming
//!
//! Auto-named outputs carry a `YYYYMMDD_HHMMSS` stamp captured once per run,
//! so the raw recording, report and stack dump of one run always match. When
//! any auto-named path already exists a `_N` suffix is appended to the stamp
//! of all three.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use perfsnap_shared::utils::time::file_stamp;
use perfsnap_shared::{OutputSet, RunRequest};
use tracing::debug;

const RAW_PREFIX: &str = "perf";
const RAW_EXT: &str = "data";
const REPORT_PREFIX: &str = "perf_report";
const FLAMEGRAPH_PREFIX: &str = "flamegraph";
const TEXT_EXT: &str = "txt";

/// Resolve the output paths for a run started at `now`
pub fn resolve(request: &RunRequest, now: &DateTime<Local>) -> OutputSet {
    let base = file_stamp(now);
    let dir = request.output_dir.as_path();
    let overrides = &request.overrides;

    let taken = |stamp: &str| {
        (overrides.raw.is_none() && auto_path(dir, RAW_PREFIX, stamp, RAW_EXT).exists())
            || (overrides.report.is_none()
                && auto_path(dir, REPORT_PREFIX, stamp, TEXT_EXT).exists())
            || (overrides.flamegraph.is_none()
                && auto_path(dir, FLAMEGRAPH_PREFIX, stamp, TEXT_EXT).exists())
    };

    // Never reuse a taken stamp
    let mut stamp = base.clone();
    let mut n: u64 = 0;
    while taken(&stamp) {
        n += 1;
        stamp = format!("{base}_{n}");
    }
    if stamp != base {
        debug!("Output stamp {} taken, using {}", base, stamp);
    }

    OutputSet {
        raw: overrides
            .raw
            .clone()
            .unwrap_or_else(|| auto_path(dir, RAW_PREFIX, &stamp, RAW_EXT)),
        report: overrides
            .report
            .clone()
            .unwrap_or_else(|| auto_path(dir, REPORT_PREFIX, &stamp, TEXT_EXT)),
        flamegraph: overrides
            .flamegraph
            .clone()
            .unwrap_or_else(|| auto_path(dir, FLAMEGRAPH_PREFIX, &stamp, TEXT_EXT)),
        stamp,
    }
}

fn auto_path(dir: &Path, prefix: &str, stamp: &str, ext: &str) -> PathBuf {
    dir.join(format!("{prefix}_{stamp}.{ext}"))
}
