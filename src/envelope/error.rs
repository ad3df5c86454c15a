//! Envelope error definitions.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while building an envelope or settling its completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Construction parameters were rejected before use.
    #[error("Invalid request config: {0}")]
    InvalidConfig(String),

    /// The inbound call could not be turned into an envelope.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// A completion handle was settled twice. This is a contract violation
    /// in the calling stage, never a client-facing condition.
    #[error("Completion already settled")]
    AlreadySettled,

    /// The envelope passed its deadline while still pending.
    #[error("Request expired before completion")]
    Expired,

    /// The request was explicitly aborted.
    #[error("Request cancelled")]
    Cancelled,

    /// The awaiter gave up waiting. The handle itself stays pending.
    #[error("Timed out after {0:?} waiting for completion")]
    WaitTimedOut(Duration),

    /// Forwarding to the upstream failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The retry scheduler gave up.
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl EnvelopeError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopeError::InvalidConfig(_) => "invalid_config",
            EnvelopeError::MalformedRequest(_) => "malformed_request",
            EnvelopeError::AlreadySettled => "already_settled",
            EnvelopeError::Expired => "expired",
            EnvelopeError::Cancelled => "cancelled",
            EnvelopeError::WaitTimedOut(_) => "wait_timed_out",
            EnvelopeError::Upstream(_) => "upstream",
            EnvelopeError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Result type for envelope operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;
