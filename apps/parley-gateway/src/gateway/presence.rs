//! In-memory index of community membership and channel scheduled events.
//!
//! Built exactly once from the directory collaborator before the gateway
//! accepts connections. Read-only on the signaling hot path; the one
//! externally-triggered mutation is a whole-entry membership refresh, so an
//! entry always reflects a complete member list.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use crate::directory::Directory;

struct CommunityPresence {
    members: HashSet<String>,
    /// channel id → scheduled event ids. Inert for signaling; answers
    /// "does this channel have calls tied to an event" for the HTTP side.
    channels: HashMap<i64, Vec<i64>>,
}

/// Per-community snapshot of member identities and channel event ids.
pub struct PresenceIndex {
    inner: DashMap<i64, CommunityPresence>,
}

impl PresenceIndex {
    pub fn empty() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Build the index from the directory. An empty directory yields an
    /// empty index; a failed query is an error the caller must treat as
    /// fatal — serving with a partial index would masquerade as "no
    /// communities".
    pub async fn from_directory(directory: &dyn Directory) -> Result<Self, String> {
        let records = directory.list_communities().await?;
        let index = Self::empty();
        for record in records {
            let channels = record
                .channels
                .into_iter()
                .map(|c| (c.channel_id, c.event_ids))
                .collect();
            index.inner.insert(
                record.community_id,
                CommunityPresence {
                    members: record.member_identities.into_iter().collect(),
                    channels,
                },
            );
        }
        Ok(index)
    }

    /// Member identities of a community. Unknown ids are a normal
    /// "no recipients" case and yield the empty set.
    pub fn members_of(&self, community_id: i64) -> HashSet<String> {
        self.inner
            .get(&community_id)
            .map(|c| c.members.clone())
            .unwrap_or_default()
    }

    /// Scheduled event ids known for a channel; empty for unknown
    /// community or channel.
    pub fn events_in_channel(&self, community_id: i64, channel_id: i64) -> Vec<i64> {
        self.inner
            .get(&community_id)
            .and_then(|c| c.channels.get(&channel_id).cloned())
            .unwrap_or_default()
    }

    /// Replace a community's member list wholesale. Called by the HTTP side
    /// when membership changes; idempotent and safe to run concurrently with
    /// ongoing signaling. A previously unknown community gets a fresh entry
    /// with no channels.
    pub fn apply_membership_snapshot(&self, community_id: i64, members: Vec<String>) {
        let members: HashSet<String> = members.into_iter().collect();
        match self.inner.get_mut(&community_id) {
            Some(mut entry) => entry.members = members,
            None => {
                self.inner.insert(
                    community_id,
                    CommunityPresence {
                        members,
                        channels: HashMap::new(),
                    },
                );
            }
        }
    }

    pub fn community_count(&self) -> usize {
        self.inner.len()
    }
}
