//! Registry of live WebSocket connections, grouped by room.
//!
//! Each open socket is one entry: the writer task's channel sender keyed by
//! a connection id. Broadcasting a frame to a room walks the room's entries;
//! a failed send means the writer task is gone, so the entry is pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use solace_proto::message::RoomId;

/// Opaque handle for one registered connection.
pub type ConnId = u64;

/// In-memory directory of connected sockets per room.
///
/// Thread-safe via [`RwLock`]. Entries are ephemeral; a restart drops them
/// all, same as the history store.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, HashMap<ConnId, mpsc::UnboundedSender<Message>>>>,
    next_conn_id: AtomicU64,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection's writer channel, returning its id.
    pub async fn register(
        &self,
        room: &RoomId,
        sender: mpsc::UnboundedSender<Message>,
    ) -> ConnId {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.write().await;
        rooms.entry(room.clone()).or_default().insert(id, sender);
        id
    }

    /// Removes a connection; drops the room entry when it empties.
    pub async fn unregister(&self, room: &RoomId, conn: ConnId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Number of sockets currently bound to a room.
    pub async fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashMap::len)
    }

    /// Sends a frame to every socket in the room, pruning dead entries.
    pub async fn broadcast(&self, room: &RoomId, frame: &Message) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|conn, sender| {
                let alive = sender.send(frame.clone()).is_ok();
                if !alive {
                    tracing::debug!(room = %room, conn = conn, "pruning dead connection");
                }
                alive
            });
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Sends a frame to one connection in the room, if it is still there.
    pub async fn send_to(&self, room: &RoomId, conn: ConnId, frame: Message) {
        let rooms = self.rooms.read().await;
        if let Some(sender) = rooms.get(room).and_then(|members| members.get(&conn)) {
            let _ = sender.send(frame);
        }
    }
}
