//! Community fan-out: one payload to all-but-one members with a live
//! connection.
//!
//! Stateless composition of the presence index and the connection registry.
//! This is the core's only outbound API surface — HTTP-side handlers call it
//! after membership or role changes to notify already-connected members.

use std::sync::Arc;

use super::connections::ConnectionRegistry;
use super::events::Envelope;
use super::presence::PresenceIndex;

#[derive(Clone)]
pub struct Broadcaster {
    presence: Arc<PresenceIndex>,
    connections: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(presence: Arc<PresenceIndex>, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            presence,
            connections,
        }
    }

    /// Send `envelope` to every member of the community except `exclude`.
    /// Members without a live connection are skipped without error. Returns
    /// the number of connections the payload was queued to.
    pub fn broadcast_to_community(
        &self,
        community_id: i64,
        exclude: &str,
        envelope: &Envelope,
    ) -> usize {
        let mut delivered = 0;
        for member in self.presence.members_of(community_id) {
            if member == exclude {
                continue;
            }
            if let Some(conn) = self.connections.lookup(&member) {
                if conn.send(envelope.clone()) {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(community_id, %exclude, delivered, "community broadcast");
        delivered
    }
}
