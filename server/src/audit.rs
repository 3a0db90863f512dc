//! Audit logging for profiler control events.
//!
//! All events are emitted via `tracing` with a dedicated target so they can be
//! filtered and formatted (e.g. JSON) for audit pipelines.

use flareprof_shared::types::events::ProfilerKind;
use tracing::{info, warn};

const AUDIT_TARGET: &str = "flareprof::audit";

/// Log a session start.
pub fn session_started(kind: ProfilerKind, output_path: &str) {
    info!(
        target: AUDIT_TARGET,
        event = "session_start",
        kind = %kind,
        output_path = %output_path,
        result = "ok",
    );
}

/// Log a session stop.
pub fn session_stopped(kind: ProfilerKind, duration_ms: u64) {
    info!(
        target: AUDIT_TARGET,
        event = "session_stop",
        kind = %kind,
        duration_ms = duration_ms,
        result = "ok",
    );
}

/// Log a start or stop rejected by the session state.
pub fn control_rejected(kind: ProfilerKind, action: &str, reason: &str) {
    warn!(
        target: AUDIT_TARGET,
        event = "session_control_rejected",
        kind = %kind,
        action = %action,
        result = "conflict",
        reason = %reason,
    );
}

/// Log admin HTTP request (metrics, health).
pub fn admin_http_request(path: &str, status: u16) {
    info!(
        target: AUDIT_TARGET,
        event = "admin_http_request",
        path = %path,
        status = %status,
    );
}
