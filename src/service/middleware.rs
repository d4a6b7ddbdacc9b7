//! Service middleware for request metrics.
//!
//! ## Metrics Exposed
//!
//! - `request_metric` events with normalised path, method, status and latency
//! - `pairing_metric` events for scheduled recomputations

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use regex_lite::Regex;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing events; aggregation happens downstream from the logs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "qa_social::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

fn numeric_segment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\d+(/|$)").expect("static pattern"))
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Numeric row ids become `:id`. User names are left alone.
pub(crate) fn normalize_path(path: &str) -> String {
    let re = numeric_segment();
    // Adjacent ids share a slash, so a single pass can miss every other one.
    let mut current = path.to_string();
    loop {
        let next = re.replace_all(&current, "/:id$1").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Record a scheduled pairing recomputation.
pub fn record_pairing_scheduled(user: &str) {
    info!(
        target: "qa_social::metrics",
        metric_type = "pairing",
        user = user,
        "pairing_metric"
    );
}
