//! Connection registry.
//!
//! Tracks currently connected users and their live channel. Entries are
//! ephemeral: they exist only while a connection is live and are never
//! persisted. Delivery is best-effort with no queuing or retry.

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::realtime::protocol::LiveMessage;
use crate::types::UserId;

/// Registry of live user channels.
///
/// Injected wherever fan-out happens; owns the only concurrently mutated
/// map in the engine.
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<UserId, mpsc::UnboundedSender<LiveMessage>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a user's connection, replacing any prior channel.
    ///
    /// Returns the receiving half; the transport layer pumps it into the
    /// user's socket. A previous receiver for the same user is dropped,
    /// closing the stale channel.
    pub fn register(&self, user_id: UserId) -> mpsc::UnboundedReceiver<LiveMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.write().unwrap().insert(user_id, tx);
        rx
    }

    /// Remove a user's channel on disconnect.
    pub fn unregister(&self, user_id: UserId) {
        self.channels.write().unwrap().remove(&user_id);
    }

    /// Push a message to a connected user.
    ///
    /// Silent no-op when the user has no open or writable channel; a send
    /// into a closed channel also evicts the stale entry. Returns whether
    /// the message was handed to a live channel.
    pub fn send(&self, user_id: UserId, message: LiveMessage) -> bool {
        let sender = {
            let channels = self.channels.read().unwrap();
            match channels.get(&user_id) {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };

        if sender.send(message).is_err() {
            tracing::debug!(user_id, "evicting closed live channel");
            self.channels.write().unwrap().remove(&user_id);
            return false;
        }

        true
    }

    /// Whether the user currently has a registered channel.
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.channels.read().unwrap().contains_key(&user_id)
    }

    /// Ids of all currently connected users.
    pub fn connected_ids(&self) -> Vec<UserId> {
        self.channels.read().unwrap().keys().copied().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.channels.read().unwrap().len()
    }

    /// Whether no users are connected.
    pub fn is_empty(&self) -> bool {
        self.channels.read().unwrap().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
