//! Profiler error types

use crate::calltree::TreeError;
use crate::output::OutputError;
use flareprof_shared::types::events::ProfilerKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("{0} profiler is already running")]
    AlreadyRunning(ProfilerKind),

    #[error("{0} profiler is not running")]
    NotRunning(ProfilerKind),

    #[error("export failed: {0}")]
    Export(#[from] TreeError),

    #[error("output failed: {0}")]
    Output(#[from] OutputError),
}

impl ProfilerError {
    /// Errors caused by calling a control operation in the wrong state
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            ProfilerError::AlreadyRunning(_) | ProfilerError::NotRunning(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
