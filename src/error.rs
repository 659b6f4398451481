use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::dispatch::ResponseEnvelope;

/// Conditions that end a request before any probe runs.
///
/// Probe failures are not listed here: they are ordinary 200 responses with
/// the message in the envelope's `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Auth failed")]
    Unauthorized,

    #[error("host required")]
    MissingHost,

    #[error("Server is too busy, try again later")]
    Overloaded,
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Unauthorized => StatusCode::FORBIDDEN,
            DispatchError::MissingHost => StatusCode::BAD_REQUEST,
            DispatchError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// A terminal dispatch error together with the envelope reported for it
#[derive(Debug)]
pub struct Rejection {
    pub reason: DispatchError,
    pub envelope: ResponseEnvelope,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.reason.status_code(), Json(self.envelope)).into_response()
    }
}
