//! Probe endpoint handler.
//!
//! Query parameters: `key` (credential), `host` (required) and `method`
//! (`http`, `https`, anything else means ping). Every outcome is reported as
//! the JSON envelope; probe failures are 200 responses with `error` set.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatched, ProbeRequest};
use crate::probe::ProbeMethod;
use crate::state::AppState;

/// Raw query parameters. The first occurrence of each name wins.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeQuery {
    pub key: Option<String>,
    pub host: Option<String>,
    pub method: Option<String>,
}

impl ProbeQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "key" => &mut query.key,
                "host" => &mut query.host,
                "method" => &mut query.method,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }

    pub fn into_request(self) -> ProbeRequest {
        ProbeRequest::new(
            self.host.unwrap_or_default(),
            ProbeMethod::from_query(self.method.as_deref()),
            self.key,
        )
    }
}

/// Handler for the probe endpoint.
///
/// A malformed query string is treated as empty so that it is reported as a
/// missing host rather than an extractor rejection page.
pub async fn probe(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Response {
    let pairs = match query {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unparsable query string");
            Vec::new()
        }
    };
    let request = ProbeQuery::from_pairs(pairs).into_request();

    // Fires when this future is dropped: client disconnect or handler deadline.
    let cancel = CancellationToken::new();
    let _caller = cancel.clone().drop_guard();

    match state.dispatcher.dispatch(request, &cancel).await {
        Ok(Dispatched::Completed(envelope)) => Json(envelope).into_response(),
        // Only reachable once the caller is gone; nothing will be written.
        Ok(Dispatched::Abandoned) => StatusCode::REQUEST_TIMEOUT.into_response(),
        Err(rejection) => rejection.into_response(),
    }
}
