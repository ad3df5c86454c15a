//! Mapping envelope outcomes to client responses.
//!
//! # Design Decisions
//! - Malformed inbound calls are client errors (400)
//! - Expiry and awaiter timeouts are 504 Gateway Timeout
//! - Upstream failures are 502 Bad Gateway
//! - Cancellation uses 499 (client closed request)
//! - Contract violations never leak details to the client

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::envelope::EnvelopeError;

/// Non-standard status for requests aborted by the client side.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

impl EnvelopeError {
    /// HTTP status surfaced to the caller for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EnvelopeError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            EnvelopeError::Expired | EnvelopeError::WaitTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            EnvelopeError::Upstream(_) | EnvelopeError::RetriesExhausted { .. } => StatusCode::BAD_GATEWAY,
            EnvelopeError::Cancelled => {
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
            }
            EnvelopeError::InvalidConfig(_) | EnvelopeError::AlreadySettled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            EnvelopeError::InvalidConfig(_) | EnvelopeError::AlreadySettled => {
                tracing::error!(error = %self, "Internal envelope error surfaced to client");
                "Internal proxy error".to_string()
            }
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
