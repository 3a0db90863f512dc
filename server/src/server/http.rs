//! HTTP server: admin endpoints (/healthz, /metrics) in front of the API

use super::api;
use super::AppState;
use crate::audit;
use crate::metrics;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { handle(req, &state).await }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!("HTTP server listening on {}", server.local_addr());

    server
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

pub async fn handle(req: Request<Body>, state: &AppState) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path().to_string();
    match path.as_str() {
        "/healthz" => {
            audit::admin_http_request("/healthz", 200);
            Ok(Response::new(Body::from("ok\n")))
        }

        "/metrics" => {
            metrics::refresh_session_gauges(&state.profiler);
            let mut res = Response::new(Body::from(metrics::encode_metrics()));
            res.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            audit::admin_http_request("/metrics", 200);
            Ok(res)
        }

        _ => api::handle_api(req, state).await,
    }
}
