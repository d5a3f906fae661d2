// ============================================================================
// REQUEST METRICS MIDDLEWARE
// ============================================================================

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::record_http_request;

const KNOWN_ROUTES: &[&str] = &[
    "/api/read-receipt",
    "/analyze",
    "/api/check-expense",
    "/health",
    "/metrics",
];

/// Records count and latency for every HTTP request.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = normalize_path(req.uri().path());

    let response = next.run(req).await;

    record_http_request(
        &method,
        endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Static assets are folded into one label to keep cardinality bounded.
fn normalize_path(path: &str) -> &'static str {
    KNOWN_ROUTES
        .iter()
        .find(|route| **route == path)
        .copied()
        .unwrap_or("static")
}
