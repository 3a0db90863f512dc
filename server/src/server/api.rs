//! REST API for profiler control and flamegraph export.
//! Serves /api/status, /api/{cpu,heap}/{start,stop,flamegraph,svg,collapsed,analyze},
//! /pprof/profile and /pprof/symbol with JSON (or text) bodies and CORS.

use super::AppState;
use crate::audit;
use crate::config::MAX_SVG_WIDTH;
use crate::metrics;
use flareprof_agent::output::{render_svg, to_collapsed, to_document};
use flareprof_agent::{ProfilerError, StoppedSession, SvgOptions};
use flareprof_shared::types::events::ProfilerKind;
use flareprof_shared::types::status::{ErrorResponse, StartResponse, StopResponse};
use flareprof_shared::utils::parse_address;
use hyper::body::{Bytes, HttpBody};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Longest timed capture, in seconds
pub const MAX_CAPTURE_SECONDS: u64 = 300;

/// Default length of `/api/{kind}/analyze`
const DEFAULT_ANALYZE_SECONDS: u64 = 10;

/// Default length of `/pprof/profile`
const DEFAULT_PROFILE_SECONDS: u64 = 30;

/// Largest `/pprof/symbol` request body
pub const MAX_SYMBOL_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
enum QueryError {
    #[error("invalid width {0:?}: expected 1..={max}", max = MAX_SVG_WIDTH)]
    Width(String),

    #[error("invalid {0} {1:?}: expected a whole number of seconds")]
    Seconds(&'static str, String),

    #[error("invalid output_type {0:?}: expected svg, json or collapsed")]
    OutputType(String),
}

/// Rendering requested from a timed capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputType {
    Svg,
    Json,
    Collapsed,
}

fn response(body: Body, status: StatusCode, content_type: &'static str) -> Response<Body> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    add_cors_headers(res)
}

fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response<Body> {
    match serde_json::to_string(value) {
        Ok(body) => response(Body::from(body), status, "application/json"),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            response(
                Body::from(r#"{"success":false,"error":"serialization failed"}"#),
                StatusCode::INTERNAL_SERVER_ERROR,
                "application/json",
            )
        }
    }
}

fn error_response(message: impl Into<String>, status: StatusCode) -> Response<Body> {
    json_response(&ErrorResponse::new(message), status)
}

fn text_response(body: String, content_type: &'static str) -> Response<Body> {
    response(Body::from(body), StatusCode::OK, content_type)
}

fn cors_preflight() -> Response<Body> {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::NO_CONTENT;
    let headers = res.headers_mut();
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert("Access-Control-Max-Age", HeaderValue::from_static("86400"));
    add_cors_headers(res)
}

fn add_cors_headers(mut res: Response<Body>) -> Response<Body> {
    res.headers_mut()
        .insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    res
}

fn not_found() -> Response<Body> {
    error_response("not found", StatusCode::NOT_FOUND)
}

fn method_not_allowed() -> Response<Body> {
    error_response("method not allowed", StatusCode::METHOD_NOT_ALLOWED)
}

pub async fn handle_api(
    req: Request<Body>,
    state: &AppState,
) -> Result<Response<Body>, hyper::Error> {
    if req.method() == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    let (path, method) = (req.uri().path().to_string(), req.method().clone());
    let query = parse_query(req.uri().query());

    if path == "/api/status" {
        if method != Method::GET {
            return Ok(method_not_allowed());
        }
        return Ok(json_response(&state.profiler.status(), StatusCode::OK));
    }

    if path == "/pprof/symbol" {
        if method != Method::POST {
            return Ok(method_not_allowed());
        }
        let Some(body) = read_body(req.into_body(), MAX_SYMBOL_BODY_BYTES).await? else {
            return Ok(error_response(
                format!("request body exceeds {} bytes", MAX_SYMBOL_BODY_BYTES),
                StatusCode::PAYLOAD_TOO_LARGE,
            ));
        };
        let text = String::from_utf8_lossy(&body);
        return Ok(text_response(
            symbolize_lines(state, &text),
            "text/plain; charset=utf-8",
        ));
    }

    if path == "/pprof/profile" {
        if method != Method::GET {
            return Ok(method_not_allowed());
        }
        return Ok(pprof_profile(state, &query).await);
    }

    let Some((kind, action)) = path
        .strip_prefix("/api/")
        .and_then(|rest| rest.split_once('/'))
    else {
        return Ok(not_found());
    };
    let Ok(kind) = kind.parse::<ProfilerKind>() else {
        return Ok(not_found());
    };

    let res = match (action, method) {
        ("start", Method::POST) => start(state, kind),
        ("stop", Method::POST) => stop(state, kind),
        ("flamegraph", Method::GET) => flamegraph(state, kind, &query).await,
        ("svg", Method::GET) => svg(state, kind, &query).await,
        ("collapsed", Method::GET) => collapsed(state, kind).await,
        ("analyze", Method::GET | Method::POST) => analyze(state, kind, &query).await,
        ("start" | "stop" | "flamegraph" | "svg" | "collapsed" | "analyze", _) => {
            method_not_allowed()
        }
        _ => not_found(),
    };
    Ok(res)
}

fn start(state: &AppState, kind: ProfilerKind) -> Response<Body> {
    match state.profiler.start(kind) {
        Ok(output_path) => {
            metrics::record_transition(kind, "start", true);
            audit::session_started(kind, &output_path);
            json_response(
                &StartResponse {
                    success: true,
                    output_path,
                },
                StatusCode::OK,
            )
        }
        Err(e) => control_failure(kind, "start", e),
    }
}

fn stop(state: &AppState, kind: ProfilerKind) -> Response<Body> {
    match state.profiler.stop(kind) {
        Ok(duration_ms) => {
            metrics::record_transition(kind, "stop", true);
            audit::session_stopped(kind, duration_ms);
            json_response(
                &StopResponse {
                    success: true,
                    duration_ms,
                },
                StatusCode::OK,
            )
        }
        Err(e) => control_failure(kind, "stop", e),
    }
}

fn control_failure(kind: ProfilerKind, action: &str, e: ProfilerError) -> Response<Body> {
    metrics::record_transition(kind, action, false);
    if e.is_state_conflict() {
        audit::control_rejected(kind, action, &e.to_string());
        error_response(e.to_string(), StatusCode::CONFLICT)
    } else {
        error!(kind = %kind, action = %action, "Session control failed: {}", e);
        error_response(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Run one export on the blocking pool, recording its outcome and latency
async fn timed_export<T, F>(
    kind: ProfilerKind,
    format: &'static str,
    export: F,
) -> Result<T, Response<Body>>
where
    F: FnOnce() -> Result<T, ProfilerError> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let result = match tokio::task::spawn_blocking(export).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("export task failed: {}", e)),
    };
    metrics::record_export(
        kind,
        format,
        result.is_ok(),
        started.elapsed().as_secs_f64(),
    );

    result.map_err(|e| {
        error!(kind = %kind, format = %format, "Export failed: {}", e);
        error_response(e, StatusCode::INTERNAL_SERVER_ERROR)
    })
}

async fn flamegraph(
    state: &AppState,
    kind: ProfilerKind,
    query: &HashMap<String, String>,
) -> Response<Body> {
    let focus: Vec<String> = query
        .get("focus")
        .map(|f| {
            f.split(';')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let profiler = state.profiler.clone();
    let result = timed_export(kind, "json", move || {
        if focus.is_empty() {
            profiler.flamegraph(kind).map(Some)
        } else {
            let path: Vec<&str> = focus.iter().map(String::as_str).collect();
            profiler.flamegraph_focus(kind, &path)
        }
    })
    .await;

    match result {
        Ok(Some(document)) => json_response(&document, StatusCode::OK),
        Ok(None) => error_response("focus path not found", StatusCode::NOT_FOUND),
        Err(res) => res,
    }
}

async fn svg(
    state: &AppState,
    kind: ProfilerKind,
    query: &HashMap<String, String>,
) -> Response<Body> {
    let options = match svg_options(state, kind, query) {
        Ok(options) => options,
        Err(e) => return error_response(e.to_string(), StatusCode::BAD_REQUEST),
    };

    let profiler = state.profiler.clone();
    match timed_export(kind, "svg", move || profiler.svg(kind, &options)).await {
        Ok(svg) => text_response(svg, "text/xml"),
        Err(res) => res,
    }
}

fn svg_options(
    state: &AppState,
    kind: ProfilerKind,
    query: &HashMap<String, String>,
) -> Result<SvgOptions, QueryError> {
    let mut options = SvgOptions::for_kind(kind).with_width(state.svg_width);
    options.frame_height = state.svg_frame_height;

    if let Some(width) = query.get("width") {
        match width.parse::<u32>() {
            Ok(w) if w > 0 && w <= MAX_SVG_WIDTH => options.width = w,
            _ => return Err(QueryError::Width(width.clone())),
        }
    }
    if let Some(title) = query.get("title") {
        options.title = title.clone();
    }
    Ok(options)
}

async fn collapsed(state: &AppState, kind: ProfilerKind) -> Response<Body> {
    let profiler = state.profiler.clone();
    match timed_export(kind, "collapsed", move || profiler.collapsed(kind)).await {
        Ok(folded) => text_response(folded, "text/plain; charset=utf-8"),
        Err(res) => res,
    }
}

/// Whole seconds from `key`, clamped to 1..=MAX_CAPTURE_SECONDS
fn capture_seconds(
    query: &HashMap<String, String>,
    key: &'static str,
    default: u64,
) -> Result<u64, QueryError> {
    match query.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(|seconds| seconds.clamp(1, MAX_CAPTURE_SECONDS as i64) as u64)
            .map_err(|_| QueryError::Seconds(key, raw.clone())),
    }
}

fn output_type(query: &HashMap<String, String>) -> Result<OutputType, QueryError> {
    match query.get("output_type").map(String::as_str) {
        None | Some("svg") | Some("flamegraph") => Ok(OutputType::Svg),
        Some("json") => Ok(OutputType::Json),
        Some("collapsed") => Ok(OutputType::Collapsed),
        Some(other) => Err(QueryError::OutputType(other.to_string())),
    }
}

/// Start a session, let it run for `seconds`, then stop it.
///
/// The wait runs in its own task so the session is stopped even when the
/// client goes away mid-capture.
async fn capture(
    state: &AppState,
    kind: ProfilerKind,
    seconds: u64,
) -> Result<StoppedSession, Response<Body>> {
    let profiler = state.profiler.clone();
    match profiler.start(kind) {
        Ok(output_path) => {
            metrics::record_transition(kind, "start", true);
            audit::session_started(kind, &output_path);
        }
        Err(e) => return Err(control_failure(kind, "start", e)),
    }
    info!(kind = %kind, seconds = seconds, "Timed capture started");

    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
        profiler.finish(kind)
    });

    match task.await {
        Ok(Ok(stopped)) => {
            metrics::record_transition(kind, "stop", true);
            audit::session_stopped(kind, stopped.duration_ms);
            Ok(stopped)
        }
        Ok(Err(e)) => Err(control_failure(kind, "stop", e)),
        Err(e) => {
            error!(kind = %kind, "Timed capture task failed: {}", e);
            Err(error_response(
                format!("capture task failed: {}", e),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn analyze(
    state: &AppState,
    kind: ProfilerKind,
    query: &HashMap<String, String>,
) -> Response<Body> {
    let parsed = capture_seconds(query, "duration", DEFAULT_ANALYZE_SECONDS)
        .and_then(|seconds| Ok((seconds, output_type(query)?, svg_options(state, kind, query)?)));
    let (seconds, output, options) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e.to_string(), StatusCode::BAD_REQUEST),
    };

    let stopped = match capture(state, kind, seconds).await {
        Ok(stopped) => stopped,
        Err(res) => return res,
    };

    match output {
        OutputType::Svg => {
            let result = timed_export(kind, "svg", move || {
                let tree = stopped.snapshot().call_tree()?;
                Ok(render_svg(&tree, &options))
            })
            .await;
            match result {
                Ok(svg) => text_response(svg, "text/xml"),
                Err(res) => res,
            }
        }
        OutputType::Json => {
            let result = timed_export(kind, "json", move || {
                let tree = stopped.snapshot().call_tree()?;
                Ok(to_document(tree.root()))
            })
            .await;
            match result {
                Ok(document) => json_response(&document, StatusCode::OK),
                Err(res) => res,
            }
        }
        OutputType::Collapsed => match collapsed_of(kind, stopped).await {
            Ok(folded) => text_response(folded, "text/plain; charset=utf-8"),
            Err(res) => res,
        },
    }
}

async fn collapsed_of(
    kind: ProfilerKind,
    stopped: StoppedSession,
) -> Result<String, Response<Body>> {
    timed_export(kind, "collapsed", move || {
        let tree = stopped.snapshot().call_tree()?;
        Ok(to_collapsed(&tree))
    })
    .await
}

/// Timed CPU capture answered with folded stacks as a download
async fn pprof_profile(state: &AppState, query: &HashMap<String, String>) -> Response<Body> {
    let seconds = match capture_seconds(query, "seconds", DEFAULT_PROFILE_SECONDS) {
        Ok(seconds) => seconds,
        Err(e) => return error_response(e.to_string(), StatusCode::BAD_REQUEST),
    };

    let stopped = match capture(state, ProfilerKind::Cpu, seconds).await {
        Ok(stopped) => stopped,
        Err(res) => return res,
    };

    match collapsed_of(ProfilerKind::Cpu, stopped).await {
        Ok(folded) => {
            let mut res = text_response(folded, "text/plain; charset=utf-8");
            res.headers_mut().insert(
                CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=profile.folded"),
            );
            res
        }
        Err(res) => res,
    }
}

/// Collect a request body, giving up once it grows past `limit` bytes
async fn read_body(mut body: Body, limit: usize) -> Result<Option<Bytes>, hyper::Error> {
    if body.size_hint().lower() > limit as u64 {
        return Ok(None);
    }

    let mut collected = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if collected.len() + chunk.len() > limit {
            return Ok(None);
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(Some(Bytes::from(collected)))
}

/// Answer a pprof-style symbol lookup: one `<address> <symbol>` line per
/// address. Comments and blank lines are skipped, unparsable input is echoed.
fn symbolize_lines(state: &AppState, body: &str) -> String {
    let mut output = String::new();
    let mut resolved = 0usize;

    for token in body.split(&['\n', '+'][..]) {
        let token = token.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }
        match parse_address(token) {
            Ok(address) => {
                output.push_str(token);
                output.push(' ');
                output.push_str(&state.profiler.resolve_symbol(address));
                resolved += 1;
            }
            Err(_) => output.push_str(token),
        }
        output.push('\n');
    }

    info!("Resolved {} symbols", resolved);
    output
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for part in q.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                params.insert(percent_decode(k), percent_decode(v));
            }
        }
    }
    params
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
