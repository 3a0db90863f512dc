//! Session status and control API bodies

use serde::{Deserialize, Serialize};

/// Point-in-time state of one profiler session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub running: bool,

    /// Elapsed time while running, final duration once stopped, null when idle
    pub duration_ms: Option<u64>,

    /// Output path identifier handed out by the last start
    pub output_path: Option<String>,

    /// Samples held by the current session
    pub samples: u64,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            running: false,
            duration_ms: None,
            output_path: None,
            samples: 0,
        }
    }
}

/// Combined status of both profilers (`GET /api/status`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub cpu: SessionStatus,
    pub heap: SessionStatus,
}

/// Body of a successful start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
    pub output_path: String,
}

/// Body of a successful stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub duration_ms: u64,
}

/// Body of any failed control or export request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status_serializes_null_duration() {
        let value = serde_json::to_value(SessionStatus::idle()).unwrap();
        assert_eq!(value["running"], false);
        assert!(value["durationMs"].is_null());
        assert!(value["outputPath"].is_null());
    }

    #[test]
    fn test_error_response_is_unsuccessful() {
        let value = serde_json::to_value(ErrorResponse::new("boom")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
    }
}
