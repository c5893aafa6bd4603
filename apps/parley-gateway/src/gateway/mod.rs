pub mod broadcast;
pub mod connections;
pub mod events;
pub mod presence;
pub mod rooms;
pub mod router;
pub mod server;
