//! Network layer: the WebSocket gateway and per-connection Client Actors.

mod connection;
mod gateway;

pub use connection::{ClientSession, CloseReason, ConnState, Connection, ConnectionError};
pub use gateway::Gateway;

use crate::config::{Config, LimitsConfig};
use crate::db::Database;
use crate::hub::Hub;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Everything a connection needs from the running server.
#[derive(Clone)]
pub struct ServerContext {
    pub hub: Hub,
    pub db: Database,
    pub config: Arc<Config>,
}

/// Transport settings for accepted sockets.
///
/// Frames and messages above `limits.max_frame_bytes` fail the read, which
/// closes the connection.
pub fn websocket_config(limits: &LimitsConfig) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(limits.max_frame_bytes);
    config.max_frame_size = Some(limits.max_frame_bytes);
    config
}
