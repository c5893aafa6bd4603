//! Registry of global signaling connections, one per verified identity.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::Envelope;

/// Cheap clonable handle to one live signaling connection.
///
/// Registries store handles, never socket halves: the writer task owns the
/// sink, and a handle whose receiver is gone simply fails to send. The `id`
/// is process-unique so a replaced connection's late teardown cannot evict
/// its successor.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver its writer task drains.
    pub fn new_pair(id: u64) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue an envelope for delivery. Best-effort: returns `false` if the
    /// connection is already gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }
}

/// Maps a verified identity to its single active global connection.
pub struct ConnectionRegistry {
    inner: DashMap<String, ConnectionHandle>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a process-unique connection id.
    pub fn next_connection_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a connection for an identity. Unconditionally overwrites any
    /// prior entry — last writer wins, no dual-login fan-out.
    pub fn register(&self, identity: &str, handle: ConnectionHandle) {
        self.inner.insert(identity.to_string(), handle);
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.inner.get(identity).map(|h| h.clone())
    }

    /// Remove the entry if present; no-op otherwise.
    pub fn unregister(&self, identity: &str) {
        self.inner.remove(identity);
    }

    /// Remove the entry only if it still belongs to the given connection.
    /// Used on teardown so a superseded socket cannot evict its replacement.
    pub fn unregister_if(&self, identity: &str, conn_id: u64) {
        self.inner.remove_if(identity, |_, h| h.id == conn_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
