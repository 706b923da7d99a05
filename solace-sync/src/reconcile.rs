//! Reconciliation of socket events against local state.
//!
//! Messages reach a client twice when it sent them: once as the optimistic
//! local append, once as the server's broadcast echo. The reconciler
//! classifies each inbound frame and decides the single store mutation it
//! should produce, dropping echoes of the local user's own messages.

use chrono::Utc;

use solace_proto::frame::{InboundFrame, NewMessage};
use solace_proto::message::{Message, MessageId, Origin, UserId};

use crate::store::StatusField;

/// The store mutation an inbound frame reduces to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append a remote peer's message.
    Append(Message),
    /// Set a status flag on an existing message.
    SetStatus(MessageId, StatusField),
    /// The frame requires no store change (echo of a local message).
    Drop,
}

/// Classifies inbound frames for one chat session.
#[derive(Debug, Clone)]
pub struct Reconciler {
    local_user_id: Option<UserId>,
    local_display_name: Option<String>,
}

impl Reconciler {
    /// Creates a reconciler for the given local identity.
    #[must_use]
    pub const fn new(local_user_id: Option<UserId>, local_display_name: Option<String>) -> Self {
        Self {
            local_user_id,
            local_display_name,
        }
    }

    /// Reduces an inbound frame to its store mutation.
    ///
    /// New-message frames from the local user are dropped: the optimistic
    /// entry is already in the store and the poll/delivery paths confirm
    /// it. Everything else appends as a remote message, already delivered
    /// (the backend broadcast it) but not yet read locally.
    #[must_use]
    pub fn reconcile(&self, frame: InboundFrame) -> Mutation {
        match frame {
            InboundFrame::NewMessage(msg) => {
                if self.is_local_origin(&msg) {
                    tracing::debug!(
                        message_id = ?msg.message_id,
                        "dropping echo of local message"
                    );
                    return Mutation::Drop;
                }
                Mutation::Append(Message {
                    id: msg.message_id.unwrap_or_else(MessageId::client_generated),
                    content: msg.content,
                    author_id: msg.author_id,
                    author_full_name: msg.author_name,
                    timestamp: msg.timestamp.unwrap_or_else(Utc::now),
                    is_delivered: true,
                    is_read: false,
                    origin: Origin::Remote,
                })
            }
            InboundFrame::MessageDelivered { message_id } => {
                Mutation::SetStatus(message_id, StatusField::Delivered)
            }
            InboundFrame::MessageRead { message_id } => {
                Mutation::SetStatus(message_id, StatusField::Read)
            }
        }
    }

    /// Whether a new-message frame originated from the local user.
    ///
    /// The author id comparison is authoritative when both sides have an
    /// id. The display-name comparison (trimmed, case-insensitive) only
    /// runs when no id is available; it exists for older backend events
    /// and should go away once every event carries `author_id`.
    fn is_local_origin(&self, msg: &NewMessage) -> bool {
        if let (Some(local), Some(author)) = (&self.local_user_id, &msg.author_id) {
            return local == author;
        }
        match (&self.local_display_name, &msg.author_name) {
            (Some(local), Some(author)) => {
                local.trim().to_lowercase() == author.trim().to_lowercase()
            }
            _ => false,
        }
    }
}
