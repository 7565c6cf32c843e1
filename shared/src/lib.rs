//! Shared types and utilities for perfsnap
//!
//! This crate contains the data structures passed between the run controller
//! and the command-line front end, plus small formatting helpers.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{outputs::*, phase::*, request::*};
