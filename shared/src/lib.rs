//! Shared types and utilities for flareprof
//!
//! This crate contains the data structures exchanged between the profiling
//! core (`flareprof-agent`) and the HTTP surface (`flareprof-server`): raw
//! samples, resolved frames, flamegraph documents and the JSON bodies of the
//! control API.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{events::*, profile::*, status::*};
