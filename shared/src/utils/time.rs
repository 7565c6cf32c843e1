//! Time-related utilities

use chrono::{DateTime, Local};

/// `strftime` pattern for output file stamps
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Format a wall-clock instant as a `YYYYMMDD_HHMMSS` file stamp
pub fn file_stamp(at: &DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Human-friendly seconds, e.g. `1.50s`
pub fn format_secs(d: std::time::Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}
