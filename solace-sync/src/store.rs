//! Ordered, de-duplicated message store.
//!
//! Holds one room's messages sorted by timestamp (ties keep insertion
//! order) and unique by id. Status flags mutate in place; removal only
//! happens when an optimistic send rolls back.

use chrono::{DateTime, Local, Utc};

use solace_proto::message::{Message, MessageId, Origin};

/// Which delivery-status flag to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    /// The backend confirmed delivery.
    Delivered,
    /// The recipient read the message.
    Read,
}

/// Result of appending a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was new and inserted in timestamp order.
    Inserted,
    /// The id matched a local optimistic entry, which is now confirmed.
    Confirmed,
    /// The id was already present; nothing changed.
    Duplicate,
}

/// Messages of one day, labeled for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    /// Render label, e.g. `"Monday, June 2, 2025"`.
    pub label: String,
    /// The day's messages in store order.
    pub messages: Vec<Message>,
}

/// In-memory message list for the bound room.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// All messages in render order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a message with the given id is present.
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| m.id == *id)
    }

    /// Inserts a message at its timestamp position.
    ///
    /// Duplicate ids are a no-op, except when the existing entry is a local
    /// optimistic one: then the entry is upgraded to [`Origin::Confirmed`]
    /// instead of being inserted twice.
    pub fn append(&mut self, message: Message) -> AppendOutcome {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            if existing.origin == Origin::Local {
                existing.origin = Origin::Confirmed;
                existing.is_delivered = existing.is_delivered || message.is_delivered;
                return AppendOutcome::Confirmed;
            }
            return AppendOutcome::Duplicate;
        }

        // Back-scan from the tail; chronological arrival is the common case.
        let mut idx = self.messages.len();
        while idx > 0 && self.messages[idx - 1].timestamp > message.timestamp {
            idx -= 1;
        }
        self.messages.insert(idx, message);
        AppendOutcome::Inserted
    }

    /// Sets a status flag on the referenced message.
    ///
    /// Returns `false` when no message has that id; status events for
    /// unknown messages are ignored rather than buffered.
    pub fn update_status(&mut self, id: &MessageId, field: StatusField) -> bool {
        self.messages.iter_mut().find(|m| m.id == *id).is_some_and(|m| {
            match field {
                StatusField::Delivered => m.is_delivered = true,
                StatusField::Read => m.is_read = true,
            }
            true
        })
    }

    /// Removes the referenced message; used only for optimistic-send rollback.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == *id)?;
        Some(self.messages.remove(idx))
    }

    /// Replaces the store's contents from a fresh fetch.
    ///
    /// The incoming list is re-sorted by timestamp; the sort is stable, so
    /// equal timestamps keep the fetch order.
    pub fn reload(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.timestamp);
        self.messages = messages;
    }

    /// Drops all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Groups messages by calendar day in the device's timezone.
    ///
    /// Groups appear in the order their first message appears in the store,
    /// which is chronological given the store's ordering invariant.
    #[must_use]
    pub fn group_by_day(&self) -> Vec<DayGroup> {
        let mut groups: Vec<DayGroup> = Vec::new();
        for message in &self.messages {
            let label = day_label(&message.timestamp);
            match groups.iter_mut().find(|g| g.label == label) {
                Some(group) => group.messages.push(message.clone()),
                None => groups.push(DayGroup {
                    label,
                    messages: vec![message.clone()],
                }),
            }
        }
        groups
    }
}

/// Render label for a day, e.g. `"Monday, June 2, 2025"`.
fn day_label(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%A, %B %-d, %Y")
        .to_string()
}
