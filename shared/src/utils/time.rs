//! Time-related utilities

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Compact UTC timestamp used in generated file names (`20261017T101500`)
pub fn file_timestamp(at: SystemTime) -> String {
    let at: DateTime<Utc> = at.into();
    at.format("%Y%m%dT%H%M%S").to_string()
}
