//! Shared application state

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use relay_protocol::{ConnectionId, ServerEvent, SessionId};
use session_registry::{RegistryConfig, SessionRegistry};

use crate::Config;

/// Handle to one connected party
pub struct ClientHandle {
    /// Channel draining into the party's WebSocket
    pub tx: mpsc::Sender<ServerEvent>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Authoritative session store
    pub registry: Arc<SessionRegistry>,
    /// Connected parties: ConnectionId -> outbound channel
    pub connections: Arc<DashMap<ConnectionId, ClientHandle>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let registry = SessionRegistry::new(RegistryConfig {
            expiry_horizon: config.expiry_horizon,
            ..RegistryConfig::default()
        });
        Self {
            registry: Arc::new(registry),
            connections: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    /// Deliver an event to one connection, if it is still around.
    ///
    /// The map guard is released before awaiting so no shard lock is held
    /// across the send.
    pub async fn send_to(&self, conn: &ConnectionId, event: ServerEvent) {
        let tx = match self.connections.get(conn) {
            Some(handle) => handle.tx.clone(),
            None => return,
        };
        if tx.send(event).await.is_err() {
            debug!(connection = %conn, "dropped event for closed connection");
        }
    }
}

/// Per-connection state, created at socket accept and discarded at
/// disconnect. Passed explicitly into every relay call; nothing about a
/// connection lives in ambient scope.
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    /// The session this connection was last admitted to, if any
    pub session_id: Option<SessionId>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self {
            connection_id: ConnectionId::new(),
            session_id: None,
        }
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}
