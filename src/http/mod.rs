//! HTTP protocol boundary.
//!
//! # Data Flow
//! ```text
//! axum Request<Body>
//!     → net::track_inbound (registers ConnectionId)
//!     → request.rs (request ID, body read, RequestEnvelope)
//!     → [queue, retry, forwarding stages]
//!     → response.rs (EnvelopeError → status code)
//!     → Send to client
//! ```

pub mod request;
pub mod response;

pub use request::{RequestId, X_REQUEST_ID};
pub use response::CLIENT_CLOSED_REQUEST;
