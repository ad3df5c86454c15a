//! Request envelope subsystem.
//!
//! # Data Flow
//! ```text
//! inbound call
//!     → http::request (from_inbound_call, single body buffering point)
//!     → RequestEnvelope (+ RequestConfig copy from config::ApiRegistry)
//!     → queue / rate limiter / retry loop / forwarder (external stages)
//!     → completion.rs (settled exactly once)
//!     → awaiting transport handler
//! ```
//!
//! # Design Decisions
//! - One envelope owns one `RequestConfig` by value
//! - Completion is a one-shot handle; double settlement is an error, not a no-op
//! - Expiry deadline and upstream timeout are separate fields

pub mod completion;
pub mod error;
pub mod request_config;
pub mod request_envelope;

pub use completion::{Completion, CompletionReceiver, CompletionState, Outcome};
pub use error::{EnvelopeError, EnvelopeResult};
pub use request_config::{RequestConfig, RequestConfigBuilder, SubstitutionRule};
pub use request_envelope::{EnvelopeBuilder, RequestEnvelope, UpstreamResponse, DEFAULT_TIMEOUT, UNKNOWN_API};
