//! In-memory chat history.
//!
//! The [`HistoryStore`] keeps one append-only message log per room plus the
//! directory of direct rooms. Messages arriving over the socket keep the
//! id the sender minted; messages posted over REST get a server-assigned
//! sequence id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use solace_proto::message::{Message, MessageId, RoomId, UserId};

/// In-memory per-room message logs and the direct-room directory.
///
/// Thread-safe via [`RwLock`]. Everything is lost on restart, same as the
/// connection registry.
pub struct HistoryStore {
    logs: RwLock<HashMap<RoomId, Vec<Message>>>,
    direct_rooms: RwLock<HashMap<(UserId, UserId), RoomId>>,
    next_room_id: AtomicU64,
    next_message_id: AtomicU64,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            direct_rooms: RwLock::new(HashMap::new()),
            next_room_id: AtomicU64::new(1),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Returns the direct room for a user pair, creating it on first use.
    ///
    /// The pair is unordered: either participant starting the chat lands in
    /// the same room.
    pub async fn start_direct(&self, a: &UserId, b: &UserId) -> RoomId {
        let key = if a.as_str() <= b.as_str() {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };

        let mut rooms = self.direct_rooms.write().await;
        if let Some(existing) = rooms.get(&key) {
            return existing.clone();
        }
        let id = RoomId::new(
            self.next_room_id
                .fetch_add(1, Ordering::Relaxed)
                .to_string(),
        );
        rooms.insert(key, id.clone());
        drop(rooms);

        self.logs.write().await.entry(id.clone()).or_default();
        id
    }

    /// Whether the room has been created.
    pub async fn room_exists(&self, room: &RoomId) -> bool {
        self.logs.read().await.contains_key(room)
    }

    /// Appends a message that already carries an id (the socket send path).
    pub async fn append(&self, room: &RoomId, message: Message) {
        let mut logs = self.logs.write().await;
        logs.entry(room.clone()).or_default().push(message);
    }

    /// Appends a REST-posted message, assigning the next server id.
    pub async fn append_text(
        &self,
        room: &RoomId,
        content: &str,
        author_id: UserId,
        author_name: Option<String>,
    ) -> Message {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let message = Message {
            id: MessageId::new(id.to_string()),
            content: content.to_string(),
            author_id: Some(author_id),
            author_full_name: author_name,
            timestamp: Utc::now(),
            is_delivered: true,
            is_read: false,
            origin: solace_proto::message::Origin::Remote,
        };
        self.append(room, message.clone()).await;
        message
    }

    /// Returns the room's full history in append order.
    pub async fn history(&self, room: &RoomId) -> Option<Vec<Message>> {
        self.logs.read().await.get(room).cloned()
    }

    /// Marks every message not authored by `reader` as read.
    ///
    /// Returns the ids whose flag actually flipped, so the caller can emit
    /// one read receipt per newly read message.
    pub async fn mark_read(&self, room: &RoomId, reader: &UserId) -> Vec<MessageId> {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(room) else {
            return Vec::new();
        };
        let mut flipped = Vec::new();
        for message in log.iter_mut() {
            if !message.is_read && message.author_id.as_ref() != Some(reader) {
                message.is_read = true;
                flipped.push(message.id.clone());
            }
        }
        flipped
    }
}
