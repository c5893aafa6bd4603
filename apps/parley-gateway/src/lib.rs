pub mod auth;
pub mod config;
pub mod directory;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use config::Config;
use gateway::broadcast::Broadcaster;
use gateway::connections::ConnectionRegistry;
use gateway::presence::PresenceIndex;
use gateway::rooms::RoomManager;

/// Shared application state available to all connection handlers.
///
/// Constructed once at startup and cloned into each handler. The registries
/// are process-wide singletons behind `Arc`; only gateway handlers mutate
/// them, never external collaborators.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceIndex>,
    pub rooms: Arc<RoomManager>,
    pub broadcaster: Broadcaster,
}
