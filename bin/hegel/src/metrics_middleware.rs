//! Request tracking middleware
//!
//! Counts in-flight requests and records status and latency per matched
//! route pattern, so wildcard EC2 paths share one series.

use crate::metrics::HegelMetrics;
use crate::server::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Label used for requests that matched no route
const UNMATCHED_ROUTE: &str = "unmatched";

/// Decrements the in-flight gauge even if the request future is dropped
struct InFlight<'a>(&'a HegelMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a HegelMetrics) -> Self {
        metrics.request_started();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.request_finished();
    }
}

/// Middleware that records per-route request metrics
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |p| p.as_str().to_string());

    let _in_flight = InFlight::enter(&state.metrics);
    let response = next.run(request).await;

    let latency_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    state
        .metrics
        .record_request(&route, response.status().as_u16(), latency_us);

    response
}
