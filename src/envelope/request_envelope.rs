//! The request envelope and its lifecycle operations.
//!
//! # Lifecycle
//! ```text
//! accepted → from_inbound_call / EnvelopeBuilder::build
//!     → queue sets expiry (expire_after)
//!     → router: resolve_target, select_credential
//!     → retry loop: record_attempt, fail_if_expired, should_stop
//!     → forwarder: complete / fail          (exactly once)
//! ```
//!
//! Mutation goes through `&mut self`: the stage that popped the envelope
//! from a queue owns it exclusively until it hands it on.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::Response;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::envelope::completion::{self, Completion, CompletionReceiver, CompletionState};
use crate::envelope::error::{EnvelopeError, EnvelopeResult};
use crate::envelope::request_config::RequestConfig;
use crate::http::request::RequestId;
use crate::net::ConnectionId;
use crate::observability::metrics;

/// Default upstream timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API name used until routing assigns one.
pub const UNKNOWN_API: &str = "unknown";

/// Response type delivered through an envelope's completion handle.
pub type UpstreamResponse = Response;

/// One proxied API call in flight.
#[derive(Debug)]
pub struct RequestEnvelope {
    id: RequestId,
    method: Method,
    original_target: Uri,
    resolved_target: Option<Url>,
    source_handle: Option<ConnectionId>,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
    api_name: String,
    api_key: Option<String>,
    attempt_count: u32,
    created_at: Instant,
    expires_at: Option<Instant>,
    completion: Option<Completion<UpstreamResponse>>,
    /// Settlement marker for envelopes without a completion handle.
    detached_settled: AtomicBool,
    rate_limit_applicable: bool,
    is_streaming_request: bool,
    config: RequestConfig,
}

impl RequestEnvelope {
    /// Start building an envelope for `method` and the URI as received.
    pub fn builder(method: impl AsRef<str>, original_target: Uri) -> EnvelopeBuilder {
        EnvelopeBuilder::new(method, original_target)
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn original_target(&self) -> &Uri {
        &self.original_target
    }

    pub fn resolved_target(&self) -> Option<&Url> {
        self.resolved_target.as_ref()
    }

    /// Record the upstream URL chosen by routing.
    pub fn resolve_target(&mut self, target: Url) {
        tracing::trace!(request_id = %self.id, target = %target, "Target resolved");
        self.resolved_target = Some(target);
    }

    /// Non-owning handle to the originating connection, if tracked.
    pub fn source_handle(&self) -> Option<ConnectionId> {
        self.source_handle
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Replace the payload, e.g. after body substitution.
    pub fn set_body(&mut self, body: Option<Bytes>) {
        self.body = body;
    }

    /// Upstream call deadline. Independent of the queue expiry.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> EnvelopeResult<()> {
        if timeout.is_zero() {
            return Err(EnvelopeError::InvalidConfig("timeout must be greater than 0".into()));
        }
        self.timeout = timeout;
        Ok(())
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn set_api_name(&mut self, api_name: impl Into<String>) {
        self.api_name = api_name.into();
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Select the credential for the next attempt.
    ///
    /// Idempotent for the same key. Replacing the key after part of the
    /// request has already been sent upstream is a caller error; it is not
    /// prevented here.
    pub fn select_credential(&mut self, key: impl Into<String>) {
        let key = key.into();
        if self.api_key.as_deref() == Some(key.as_str()) {
            return;
        }
        if self.api_key.is_some() && self.attempt_count > 0 {
            tracing::debug!(
                request_id = %self.id,
                api = %self.api_name,
                attempt = self.attempt_count,
                "Replacing credential on an attempted request"
            );
        }
        self.api_key = Some(key);
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Count a forwarding attempt and return the new total. No cap is
    /// enforced here.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        metrics::record_attempt(&self.api_name);
        tracing::debug!(
            request_id = %self.id,
            api = %self.api_name,
            attempt = self.attempt_count,
            "Forwarding attempt"
        );
        self.attempt_count
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Set an absolute deadline.
    pub fn set_expires_at(&mut self, deadline: Instant) {
        self.expires_at = Some(deadline);
    }

    /// Set the deadline relative to `created_at`. A deadline past the end
    /// of the clock's range means the envelope never expires.
    pub fn expire_after(&mut self, ttl: Duration) {
        self.expires_at = self.created_at.checked_add(ttl);
        if self.expires_at.is_none() {
            tracing::warn!(request_id = %self.id, ttl = ?ttl, "Expiry out of range, envelope never expires");
        }
    }

    pub fn clear_expiry(&mut self) {
        self.expires_at = None;
    }

    /// True iff a deadline is set and `now` has reached it.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Fail a pending completion with `Expired` when the deadline has
    /// passed. Returns whether the envelope is expired.
    pub fn fail_if_expired(&self, now: Instant) -> bool {
        if !self.is_expired(now) {
            return false;
        }
        if let Some(completion) = &self.completion {
            if !completion.is_settled() && completion.fail(EnvelopeError::Expired).is_ok() {
                metrics::record_expired();
                tracing::warn!(
                    request_id = %self.id,
                    api = %self.api_name,
                    attempts = self.attempt_count,
                    "Request expired while pending"
                );
            }
        }
        true
    }

    pub fn rate_limit_applicable(&self) -> bool {
        self.rate_limit_applicable
    }

    pub fn set_rate_limit_applicable(&mut self, applicable: bool) {
        self.rate_limit_applicable = applicable;
    }

    pub fn is_streaming_request(&self) -> bool {
        self.is_streaming_request
    }

    pub fn set_streaming_request(&mut self, streaming: bool) {
        self.is_streaming_request = streaming;
    }

    /// Mark the envelope as streaming when the caller asked for an event
    /// stream, either through `Accept` or a JSON body with `"stream": true`.
    pub fn detect_streaming(&mut self) -> bool {
        let accepts_stream = self
            .headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("text/event-stream"));

        let body_requests_stream = self
            .body
            .as_ref()
            .filter(|b| !b.is_empty())
            .and_then(|b| serde_json::from_slice::<Value>(b).ok())
            .and_then(|v| v.get("stream").and_then(Value::as_bool))
            .unwrap_or(false);

        self.is_streaming_request = accepts_stream || body_requests_stream;
        self.is_streaming_request
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Replace this envelope's configuration with an override copy.
    pub fn set_config(&mut self, config: RequestConfig) {
        self.config = config;
    }

    /// Attach a fresh completion handle and return its receiver.
    ///
    /// Replacing an unsettled handle drops it; its awaiter then observes
    /// `Cancelled`.
    pub fn attach_completion(&mut self) -> CompletionReceiver<UpstreamResponse> {
        let (completion, receiver) = completion::channel();
        self.completion = Some(completion);
        receiver
    }

    /// Producer side of the attached handle, for stages that settle the
    /// envelope after handing it on.
    pub fn completion(&self) -> Option<&Completion<UpstreamResponse>> {
        self.completion.as_ref()
    }

    pub fn completion_state(&self) -> Option<CompletionState> {
        self.completion.as_ref().map(Completion::state)
    }

    pub fn is_settled(&self) -> bool {
        match &self.completion {
            Some(completion) => completion.is_settled(),
            None => self.detached_settled.load(Ordering::Acquire),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion.as_ref().is_some_and(Completion::is_cancelled)
    }

    /// Decision points check this before retrying or re-queueing: true once
    /// the envelope is settled or cancelled, or its awaiter has gone away
    /// (client disconnect, connection abort, awaiter dropped).
    pub fn should_stop(&self) -> bool {
        match &self.completion {
            Some(completion) => completion.should_stop(),
            None => self.detached_settled.load(Ordering::Acquire),
        }
    }

    /// First settlement of a fire-and-forget envelope succeeds and discards
    /// the outcome; any later one is `AlreadySettled`.
    fn settle_detached(&self, outcome: &'static str) -> EnvelopeResult<()> {
        if self.detached_settled.swap(true, Ordering::AcqRel) {
            tracing::error!(request_id = %self.id, attempted = outcome, "Envelope settled twice");
            metrics::record_contract_violation();
            return Err(EnvelopeError::AlreadySettled);
        }
        metrics::record_settled(outcome);
        Ok(())
    }

    /// Deliver the upstream response. Fire-and-forget envelopes discard it.
    pub fn complete(&self, response: UpstreamResponse) -> EnvelopeResult<()> {
        match &self.completion {
            Some(completion) => {
                completion.complete(response)?;
                tracing::debug!(
                    request_id = %self.id,
                    api = %self.api_name,
                    attempts = self.attempt_count,
                    "Request completed"
                );
                Ok(())
            }
            None => self.settle_detached(CompletionState::Completed.as_str()),
        }
    }

    /// Deliver a terminal error.
    pub fn fail(&self, error: EnvelopeError) -> EnvelopeResult<()> {
        match &self.completion {
            Some(completion) => {
                let kind = error.kind();
                completion.fail(error)?;
                tracing::debug!(
                    request_id = %self.id,
                    api = %self.api_name,
                    attempts = self.attempt_count,
                    error = kind,
                    "Request failed"
                );
                Ok(())
            }
            None if error == EnvelopeError::Cancelled => {
                self.settle_detached(CompletionState::Cancelled.as_str())
            }
            None => self.settle_detached(CompletionState::Failed.as_str()),
        }
    }

    /// Abort the request. In-flight work is not interrupted; later decision
    /// points observe `should_stop`.
    pub fn cancel(&self) -> EnvelopeResult<()> {
        match &self.completion {
            Some(completion) => {
                completion.cancel()?;
                tracing::debug!(request_id = %self.id, api = %self.api_name, "Request cancelled");
                Ok(())
            }
            None => self.settle_detached(CompletionState::Cancelled.as_str()),
        }
    }
}

/// Builder for [`RequestEnvelope`]. Every envelope gets its own fresh
/// default [`RequestConfig`].
#[derive(Debug)]
pub struct EnvelopeBuilder {
    method: String,
    original_target: Uri,
    id: Option<RequestId>,
    source_handle: Option<ConnectionId>,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
    api_name: String,
    rate_limit_applicable: bool,
    is_streaming_request: bool,
    config: Option<RequestConfig>,
}

impl EnvelopeBuilder {
    pub fn new(method: impl AsRef<str>, original_target: Uri) -> Self {
        Self {
            method: method.as_ref().to_string(),
            original_target,
            id: None,
            source_handle: None,
            headers: HeaderMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            api_name: UNKNOWN_API.to_string(),
            rate_limit_applicable: true,
            is_streaming_request: false,
            config: None,
        }
    }

    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn source_handle(mut self, handle: ConnectionId) -> Self {
        self.source_handle = Some(handle);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = api_name.into();
        self
    }

    pub fn rate_limit_applicable(mut self, applicable: bool) -> Self {
        self.rate_limit_applicable = applicable;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.is_streaming_request = streaming;
        self
    }

    pub fn config(mut self, config: RequestConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> EnvelopeResult<RequestEnvelope> {
        if self.method.trim().is_empty() {
            return Err(EnvelopeError::MalformedRequest("method is empty".into()));
        }
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|_| {
            EnvelopeError::MalformedRequest(format!("invalid method: {}", self.method))
        })?;
        if self.timeout.is_zero() {
            return Err(EnvelopeError::InvalidConfig("timeout must be greater than 0".into()));
        }

        metrics::record_envelope_created();

        Ok(RequestEnvelope {
            id: self.id.unwrap_or_default(),
            method,
            original_target: self.original_target,
            resolved_target: None,
            source_handle: self.source_handle,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            api_name: self.api_name,
            api_key: None,
            attempt_count: 0,
            created_at: Instant::now(),
            expires_at: None,
            completion: None,
            detached_settled: AtomicBool::new(false),
            rate_limit_applicable: self.rate_limit_applicable,
            is_streaming_request: self.is_streaming_request,
            config: self.config.unwrap_or_default(),
        })
    }
}
