//! Request envelope core for a reverse proxy.
//!
//! An inbound API call becomes a [`RequestEnvelope`] that carries its
//! per-request [`RequestConfig`] through queueing, rate limiting, retrying
//! and forwarding stages, and is settled exactly once through its
//! completion handle.

pub mod config;
pub mod envelope;
pub mod http;
pub mod net;
pub mod observability;

pub use config::{ApiRegistry, ProxyConfig};
pub use envelope::{
    Completion, CompletionReceiver, EnvelopeError, RequestConfig, RequestEnvelope, SubstitutionRule,
};
pub use net::{ConnectionId, ConnectionTable};
