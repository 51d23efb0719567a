use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

/// Middleware to collect HTTP request metrics
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Route template keeps label cardinality bounded; unmatched paths share one label.
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &endpoint, &status])
        .inc();

    state
        .metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, &endpoint])
        .observe(duration);

    response
}
