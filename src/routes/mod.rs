//! HTTP routes.
//!
//! The service exposes a single endpoint: every path and every method lands on
//! the probe handler. The handler deadline is enforced by a timeout layer; when
//! it fires the handler future is dropped, which cancels the running probe.

pub mod probe;

use std::time::Duration;

use axum::http::StatusCode;
use axum::{middleware, Router};
use tower_http::timeout::TimeoutLayer;

use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with the probe endpoint and its layers.
pub fn create_router(state: AppState) -> Router {
    let deadline = Duration::from_secs(state.config.http.request_timeout_seconds);

    Router::new()
        .fallback(probe::probe)
        .with_state(state)
        // Handler deadline; expiry drops the handler, kills the probe and answers
        // a bare 408 since no envelope exists yet
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            deadline,
        ))
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
