//! Broadcast hub fanning relay events out to connected dashboards.
//!
//! The hub owns one unbounded channel per client. Broadcasting walks the
//! registry and pushes a clone of the frame into each channel; a client
//! whose channel is gone is dropped from the registry without touching
//! the others. The hub is constructed once at startup and handed to the
//! components that need it.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;

/// Unique identifier for a connected dashboard client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of hub state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub clients: usize,
    pub broadcasts_total: u64,
    pub dropped_clients_total: u64,
}

/// Registry of connected clients and their outbound channels.
pub struct BroadcastHub {
    clients: RwLock<HashMap<ClientId, mpsc::UnboundedSender<ServerMessage>>>,
    broadcasts_total: AtomicU64,
    dropped_clients_total: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            broadcasts_total: AtomicU64::new(0),
            dropped_clients_total: AtomicU64::new(0),
        }
    }

    /// Registers a new client and returns its id plus the receiving end
    /// of its outbound channel.
    pub async fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().await.insert(id, tx);
        tracing::debug!(client_id = %id, "dashboard client registered");
        (id, rx)
    }

    /// Removes a client. Safe to call for an already-removed id.
    pub async fn unregister(&self, id: &ClientId) {
        if self.clients.write().await.remove(id).is_some() {
            tracing::debug!(client_id = %id, "dashboard client unregistered");
        }
    }

    /// Sends a frame to a single client. Returns `false` if the client
    /// is gone.
    pub async fn send_to(&self, id: &ClientId, message: ServerMessage) -> bool {
        let clients = self.clients.read().await;
        match clients.get(id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Pushes a frame to every connected client.
    ///
    /// A client whose channel is closed is evicted; the failure never
    /// propagates to other clients or to the caller. Returns the number
    /// of clients the frame was delivered to.
    pub async fn broadcast(&self, message: ServerMessage) -> usize {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.clients.write().await;
        let mut dead = Vec::new();

        for (id, tx) in clients.iter() {
            if tx.send(message.clone()).is_err() {
                dead.push(*id);
            }
        }

        for id in &dead {
            clients.remove(id);
            self.dropped_clients_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(client_id = %id, "dropping client with closed channel");
        }

        clients.len()
    }

    /// Number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Disconnects every client by dropping their channels. Socket tasks
    /// observe the closed channel and complete their close handshake.
    pub async fn close_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        if count > 0 {
            tracing::info!(count, "disconnected all dashboard clients");
        }
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            clients: self.clients.read().await.len(),
            broadcasts_total: self.broadcasts_total.load(Ordering::Relaxed),
            dropped_clients_total: self.dropped_clients_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
