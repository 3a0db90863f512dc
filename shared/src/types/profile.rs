//! Profile data structures
//!
//! These types represent resolved and aggregated profiling data, suitable for
//! serialization and visualization.

use serde::{Deserialize, Serialize};

/// A single resolved frame in a stack trace
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ResolvedFrame {
    /// Function name (demangled when available)
    pub name: String,

    /// Source file, empty when unknown
    pub file: String,

    /// Line number, 0 when unknown
    pub line: u32,
}

impl ResolvedFrame {
    pub fn new(name: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line,
        }
    }

    /// Frame synthesized for an address that could not be resolved
    pub fn unresolved(address: u64) -> Self {
        Self {
            name: crate::utils::format_address(address),
            file: String::new(),
            line: 0,
        }
    }

    /// Check if the frame carries source location information
    pub fn has_location(&self) -> bool {
        !self.file.is_empty()
    }
}

/// JSON form of a call tree node: `{name, value, children}`.
///
/// The root node is always named `"root"` and its `value` is the total weight
/// of every sample that reached the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlamegraphNode {
    pub name: String,
    pub value: u64,
    pub children: Vec<FlamegraphNode>,
}

impl FlamegraphNode {
    /// The document produced for a session without samples
    pub fn empty_root() -> Self {
        Self {
            name: "root".to_string(),
            value: 0,
            children: Vec::new(),
        }
    }

    /// Value not attributed to any child
    pub fn self_value(&self) -> u64 {
        let children: u64 = self.children.iter().map(|c| c.value).sum();
        self.value.saturating_sub(children)
    }
}

/// One laid-out flamegraph rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlameRect {
    pub name: String,

    /// Call depth, 0 for the root band
    pub depth: usize,

    /// Horizontal offset in pixels
    pub x: f64,

    /// Width in pixels
    pub width: f64,

    pub value: u64,
}
