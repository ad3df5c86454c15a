//! Inbound connection tracking.
//!
//! # Data Flow
//! ```text
//! axum handler stack
//!     → connection.rs::track_inbound (register, insert ConnectionId)
//!     → envelope.source_handle = ConnectionId
//!     → any stage: ConnectionTable::is_open / abort
//!     → guard drop removes the entry
//! ```

pub mod connection;

pub use connection::{track_inbound, ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionTable};
