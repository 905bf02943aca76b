use anyhow::Context;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Instant;

/// Paths left out of request metrics.
const UNMEASURED: [&str; 2] = ["/health", "/metrics"];

/// Records `http_requests_total` and `http_request_duration_seconds` by
/// route template, so path parameters do not explode label cardinality.
pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let route = match matched_path {
        Some(p) => p.as_str().to_owned(),
        None => "unmatched".to_owned(),
    };
    if UNMEASURED.contains(&route.as_str()) {
        return next.run(req).await;
    }

    let method = req.method().as_str().to_owned();
    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();

    let labels = [
        ("method", method),
        ("route", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(elapsed);

    response
}

pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
