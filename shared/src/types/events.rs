//! Event type definitions for profiling data
//!
//! These types represent the raw samples delivered by the sampling mechanism
//! (a timer tick or an allocation hook) before any symbol resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stack trace represented as an array of instruction pointers
pub type StackTrace = Vec<u64>;

/// Which profiler a session or sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilerKind {
    Cpu,
    Heap,
}

impl ProfilerKind {
    /// Both kinds, in the order they are reported.
    pub const ALL: [ProfilerKind; 2] = [ProfilerKind::Cpu, ProfilerKind::Heap];

    /// Lowercase name used in URLs, file names and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilerKind::Cpu => "cpu",
            ProfilerKind::Heap => "heap",
        }
    }

    /// Unit of a sample weight for this kind
    pub fn unit(&self) -> &'static str {
        match self {
            ProfilerKind::Cpu => "samples",
            ProfilerKind::Heap => "bytes",
        }
    }
}

impl fmt::Display for ProfilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfilerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(ProfilerKind::Cpu),
            "heap" => Ok(ProfilerKind::Heap),
            _ => Err(format!("Invalid profiler kind: {}", s)),
        }
    }
}

/// A single captured stack with its weight.
///
/// Addresses are ordered innermost (leaf) frame first, the order stack
/// unwinders produce them. Weight is 1 for a CPU tick and the allocation
/// size in bytes for a heap sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    addresses: StackTrace,
    weight: u64,
}

impl RawSample {
    /// Create a sample from leaf-first addresses
    pub fn new(addresses: StackTrace, weight: u64) -> Self {
        Self { addresses, weight }
    }

    /// Create a sample from root-first addresses (e.g. `[main, foo, bar]`)
    pub fn from_root_path(mut addresses: StackTrace, weight: u64) -> Self {
        addresses.reverse();
        Self { addresses, weight }
    }

    /// Leaf-first addresses
    pub fn addresses(&self) -> &[u64] {
        &self.addresses
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn depth(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
