use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use mediaflow_core::types::{Fingerprint, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing control frames to a WebSocket session.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket session.
pub struct WsConnection {
    /// Fingerprint the session is watching.
    pub fingerprint: Fingerprint,
    /// Channel sender for control frames (pings, shutdown close).
    pub sender: WsSender,
    /// When this session was established.
    pub connected_at: Timestamp,
}

/// Tracks every open WebSocket session.
///
/// Progress events travel through the notification hub; this manager only
/// carries server-initiated control frames so the heartbeat and shutdown
/// can reach every socket. Thread-safe via interior `RwLock`; designed to
/// be wrapped in `Arc` and shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session.
    ///
    /// Returns the receiver half of the control channel so the session can
    /// forward frames to its sink.
    pub async fn add(
        &self,
        conn_id: String,
        fingerprint: Fingerprint,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            fingerprint,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a session by its ID.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let open_for = chrono::Utc::now() - conn.connected_at;
            tracing::debug!(
                conn_id,
                fingerprint = %conn.fingerprint,
                open_secs = open_for.num_seconds(),
                "WebSocket session removed",
            );
        }
    }

    /// Return the current number of open sessions.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of sessions watching `fingerprint`.
    pub async fn watchers(&self, fingerprint: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.fingerprint == fingerprint)
            .count()
    }

    /// Send a Close frame to every session, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server exits.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every session.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
