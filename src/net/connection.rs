//! Connection table for inbound calls.
//!
//! # Responsibilities
//! - Hand out unique connection IDs used as envelope back-references
//! - Let later stages check whether the caller is still there
//! - Let later stages abort the caller's in-flight handler
//!
//! # Design Decisions
//! - Envelopes hold a `ConnectionId` (a plain index), never the connection
//! - Entries are removed when the registering guard drops
//! - Abort is signalled through a watch channel so the handler can race it

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::envelope::EnvelopeError;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an inbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct ConnectionEntry {
    remote: Option<SocketAddr>,
    opened_at: Instant,
    aborted: watch::Sender<bool>,
}

/// Snapshot of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote: Option<SocketAddr>,
    pub opened_at: Instant,
    pub aborted: bool,
}

/// Shared table of live inbound calls.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    entries: Arc<DashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new inbound call. The entry lives as long as the guard.
    pub fn register(&self, remote: Option<SocketAddr>) -> ConnectionGuard {
        let id = ConnectionId::new();
        let (aborted, _) = watch::channel(false);
        self.entries.insert(
            id,
            ConnectionEntry {
                remote,
                opened_at: Instant::now(),
                aborted,
            },
        );
        tracing::trace!(connection_id = %id, remote = ?remote, "Connection registered");
        ConnectionGuard {
            table: self.clone(),
            id,
        }
    }

    /// Registered and not aborted.
    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.entries
            .get(&id)
            .map(|entry| !*entry.aborted.borrow())
            .unwrap_or(false)
    }

    pub fn info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.entries.get(&id).map(|entry| ConnectionInfo {
            id,
            remote: entry.remote,
            opened_at: entry.opened_at,
            aborted: *entry.aborted.borrow(),
        })
    }

    /// Ask the handler serving `id` to stop. Returns false if the
    /// connection is already gone.
    pub fn abort(&self, id: ConnectionId) -> bool {
        match self.entries.get(&id) {
            Some(entry) => {
                entry.aborted.send_replace(true);
                tracing::debug!(connection_id = %id, "Connection abort requested");
                true
            }
            None => false,
        }
    }

    /// Watch the abort flag of a registered connection.
    pub fn subscribe(&self, id: ConnectionId) -> Option<watch::Receiver<bool>> {
        self.entries.get(&id).map(|entry| entry.aborted.subscribe())
    }

    /// Get current registered connection count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Guard that keeps a connection registered.
/// Removes the table entry when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    table: ConnectionTable,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.table.entries.remove(&self.id);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Middleware registering every inbound call in the table.
///
/// The `ConnectionId` is stored in request extensions, where
/// `RequestEnvelope::from_inbound_call` picks it up. An abort through the
/// table drops the handler future and answers 499.
pub async fn track_inbound(
    State(table): State<ConnectionTable>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let guard = table.register(remote);
    request.extensions_mut().insert(guard.id());

    let Some(mut aborted) = table.subscribe(guard.id()) else {
        return next.run(request).await;
    };

    tokio::select! {
        response = next.run(request) => response,
        Ok(_) = aborted.wait_for(|aborted| *aborted) => {
            tracing::info!(connection_id = %guard.id(), "Inbound call aborted");
            EnvelopeError::Cancelled.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_table_counts() {
        let table = ConnectionTable::new();
        assert!(table.is_empty());

        let guard1 = table.register(None);
        assert_eq!(table.len(), 1);

        let guard2 = table.register(Some("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.info(guard2.id()).and_then(|info| info.remote),
            Some("127.0.0.1:4000".parse().unwrap())
        );

        let id1 = guard1.id();
        drop(guard1);
        assert_eq!(table.len(), 1);
        assert!(!table.is_open(id1));
        assert!(!table.abort(id1));

        drop(guard2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn abort_is_observable() {
        let table = ConnectionTable::new();
        let guard = table.register(None);
        let mut rx = table.subscribe(guard.id()).unwrap();

        assert!(table.is_open(guard.id()));
        assert!(table.abort(guard.id()));
        assert!(!table.is_open(guard.id()));
        assert!(table.info(guard.id()).unwrap().aborted);
        assert!(rx.wait_for(|aborted| *aborted).await.is_ok());
    }
}
