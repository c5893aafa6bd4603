//! Directory collaborator: the persistent store that owns communities,
//! members, channels, and scheduled events.
//!
//! The gateway queries it exactly once at startup to build the presence
//! index. Backed by the HTTP directory service in production and a static
//! fixture in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One channel of a community, with the scheduled events attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: i64,
    #[serde(default)]
    pub event_ids: Vec<i64>,
}

/// A community snapshot as the directory reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityRecord {
    pub community_id: i64,
    pub member_identities: Vec<String>,
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

/// Abstraction over the directory service.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every community with its full member list and channel event ids.
    /// An empty store is a valid answer, not an error.
    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, String>;
}

// ---------------------------------------------------------------------------
// HTTP implementation (production)
// ---------------------------------------------------------------------------

pub struct HttpDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDirectory {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, String> {
        let url = format!("{}/internal/v1/communities", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("directory request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("directory returned error status: {e}"))?;

        resp.json::<Vec<CommunityRecord>>()
            .await
            .map_err(|e| format!("directory response malformed: {e}"))
    }
}

// ---------------------------------------------------------------------------
// Static implementation (tests / single-box dev)
// ---------------------------------------------------------------------------

pub struct StaticDirectory {
    records: Vec<CommunityRecord>,
}

impl StaticDirectory {
    pub fn new(records: Vec<CommunityRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self { records: Vec::new() }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, String> {
        Ok(self.records.clone())
    }
}
