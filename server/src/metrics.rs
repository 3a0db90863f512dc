//! Prometheus metrics for the profiler server

use flareprof_agent::Profiler;
use flareprof_shared::types::events::ProfilerKind;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tracing::warn;

// ── Session control ──────────────────────────────────────────────────────────

pub static SESSION_TRANSITIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flareprof_session_transitions_total",
        "Session start/stop requests by outcome",
        &["kind", "action", "status"]
    )
    .unwrap()
});

// ── Exports ──────────────────────────────────────────────────────────────────

pub static EXPORTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flareprof_exports_total",
        "Flamegraph exports served",
        &["kind", "format", "status"]
    )
    .unwrap()
});

pub static EXPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "flareprof_export_duration_seconds",
        "Time to aggregate and render one export",
        &["format"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap()
});

// ── Session contents (refreshed at scrape time) ──────────────────────────────

pub static SESSION_SAMPLES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "flareprof_session_samples",
        "Samples held by the current session",
        &["kind"]
    )
    .unwrap()
});

pub static SESSION_DROPPED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "flareprof_session_dropped_samples",
        "Samples dropped by the current session because it was full",
        &["kind"]
    )
    .unwrap()
});

pub fn record_transition(kind: ProfilerKind, action: &str, ok: bool) {
    SESSION_TRANSITIONS
        .with_label_values(&[kind.as_str(), action, status_label(ok)])
        .inc();
}

pub fn record_export(kind: ProfilerKind, format: &str, ok: bool, seconds: f64) {
    EXPORTS_TOTAL
        .with_label_values(&[kind.as_str(), format, status_label(ok)])
        .inc();
    EXPORT_DURATION.with_label_values(&[format]).observe(seconds);
}

/// Copy the store counters of both sessions into their gauges
pub fn refresh_session_gauges(profiler: &Profiler) {
    for kind in ProfilerKind::ALL {
        let counters = profiler.session(kind).counters();
        SESSION_SAMPLES
            .with_label_values(&[kind.as_str()])
            .set(counters.samples as f64);
        SESSION_DROPPED
            .with_label_values(&[kind.as_str()])
            .set(counters.dropped as f64);
    }
}

fn status_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
