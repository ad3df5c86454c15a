//! Inbound request conversion.
//!
//! # Responsibilities
//! - Carry or generate a request ID for tracing
//! - Read the inbound body exactly once, enforcing the size limit
//! - Turn the inbound call into a `RequestEnvelope`
//!
//! # Design Decisions
//! - An inbound `x-request-id` is kept so logs correlate across hops
//! - `from_inbound_call` is the only place a full body is buffered

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use uuid::Uuid;

use crate::envelope::{EnvelopeError, EnvelopeResult, RequestEnvelope};
use crate::net::ConnectionId;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation ID attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh UUID v4 ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Take the ID from an inbound `x-request-id` header, if present and
    /// printable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl RequestEnvelope {
    /// Build an envelope from an inbound call.
    ///
    /// Consumes the body stream, reading at most `body_limit` bytes. A body
    /// that fails to read or exceeds the limit is a `MalformedRequest`.
    pub async fn from_inbound_call(request: Request<Body>, body_limit: usize) -> EnvelopeResult<Self> {
        let (parts, body) = request.into_parts();

        let bytes = axum::body::to_bytes(body, body_limit).await.map_err(|e| {
            tracing::debug!(method = %parts.method, uri = %parts.uri, error = %e, "Failed to read request body");
            EnvelopeError::MalformedRequest(format!("failed to read request body: {}", e))
        })?;

        let id = RequestId::from_headers(&parts.headers).unwrap_or_default();
        let source = parts.extensions.get::<ConnectionId>().copied();

        let mut builder = RequestEnvelope::builder(parts.method.as_str(), parts.uri)
            .id(id)
            .headers(parts.headers);
        if !bytes.is_empty() {
            builder = builder.body(bytes);
        }
        if let Some(source) = source {
            builder = builder.source_handle(source);
        }

        let envelope = builder.build()?;
        tracing::trace!(
            request_id = %envelope.id(),
            method = %envelope.method(),
            uri = %envelope.original_target(),
            body_bytes = envelope.body().map(|b| b.len()).unwrap_or(0),
            "Envelope created"
        );
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_inbound_call() {
        let request = Request::builder()
            .method("POST")
            .uri("/openai/v1/chat/completions?x=1")
            .header("content-type", "application/json")
            .header(X_REQUEST_ID, "req-123")
            .body(Body::from(r#"{"model":"m"}"#))
            .unwrap();

        let env = RequestEnvelope::from_inbound_call(request, 1024).await.unwrap();
        assert_eq!(env.method(), "POST");
        assert_eq!(env.original_target().path(), "/openai/v1/chat/completions");
        assert_eq!(env.id().as_str(), "req-123");
        assert_eq!(env.headers()["content-type"], "application/json");
        assert_eq!(env.body().unwrap().as_ref(), br#"{"model":"m"}"#);
        assert_eq!(env.attempt_count(), 0);
        assert!(env.created_at() <= tokio::time::Instant::now());
        assert!(env.resolved_target().is_none());
        assert!(env.api_key().is_none());
        assert!(env.completion().is_none());
        assert!(env.source_handle().is_none());
    }

    #[tokio::test]
    async fn test_generates_request_id_and_empty_body() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let env = RequestEnvelope::from_inbound_call(request, 1024).await.unwrap();
        assert!(Uuid::parse_str(env.id().as_str()).is_ok());
        assert!(env.body().is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_is_malformed() {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();
        let err = RequestEnvelope::from_inbound_call(request, 16).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_body_read_error_is_malformed() {
        let chunks: Vec<Result<axum::body::Bytes, std::io::Error>> = vec![
            Ok(axum::body::Bytes::from_static(b"{\"model\":")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset")),
        ];
        let request = Request::builder()
            .method("POST")
            .uri("/openai/v1/chat/completions")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let err = RequestEnvelope::from_inbound_call(request, 1024).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_picks_up_connection_handle() {
        let id = ConnectionId::new();
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(id);

        let env = RequestEnvelope::from_inbound_call(request, 1024).await.unwrap();
        assert_eq!(env.source_handle(), Some(id));
    }
}
