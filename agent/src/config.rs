//! Configuration types for the profiler core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on samples held by one session
pub const MAX_SAMPLES_LIMIT: usize = 100_000_000;

/// Profiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Directory that session output paths point into
    pub profile_dir: PathBuf,

    /// Samples kept per session; later samples are counted as dropped
    pub max_samples: usize,

    /// Write the collapsed stacks to the output path when a session stops
    pub persist_on_stop: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("/tmp/flareprof"),
            max_samples: 1_000_000,
            persist_on_stop: false,
        }
    }
}

impl ProfilerConfig {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.profile_dir.as_os_str().is_empty() {
            anyhow::bail!("Profile directory must not be empty");
        }

        if self.max_samples == 0 {
            anyhow::bail!("max_samples must be greater than 0");
        }

        if self.max_samples > MAX_SAMPLES_LIMIT {
            anyhow::bail!("max_samples too high (max {})", MAX_SAMPLES_LIMIT);
        }

        Ok(())
    }
}
