//! WebSocket frame encoding and decoding.
//!
//! Frames are JSON text messages discriminated by a `type` field. The
//! backend has shipped several shapes over time, so decoding is tolerant:
//! the author may arrive as a nested object or a bare display name, and a
//! frame with no `type` at all is the legacy new-message shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{MessageId, UserId};

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame parsed as JSON but lacks a field its type requires.
    #[error("frame missing required field `{0}`")]
    MissingField(&'static str),
}

/// The author of an event, as the backend variously encodes it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AuthorField {
    /// Nested author object from newer backend versions.
    Object {
        #[serde(default)]
        id: Option<UserId>,
        #[serde(default)]
        pk: Option<UserId>,
        #[serde(default)]
        full_name: Option<String>,
    },
    /// Bare display name from the legacy event shape.
    Name(String),
}

/// Raw superset of every inbound frame shape; classified after parsing.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_id: Option<MessageId>,
    #[serde(default)]
    author: Option<AuthorField>,
    #[serde(default)]
    author_full_name: Option<String>,
    #[serde(default)]
    author_id: Option<UserId>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// A new chat message delivered over the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Server-assigned id, when present.
    pub message_id: Option<MessageId>,
    /// The message text.
    pub content: String,
    /// Author's user id, resolved from whichever field carried it.
    pub author_id: Option<UserId>,
    /// Author's display name, resolved from whichever field carried it.
    pub author_name: Option<String>,
    /// Server timestamp; receivers substitute their clock when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A chat message (tagged `new_message`, or the untagged legacy shape).
    NewMessage(NewMessage),
    /// The backend confirmed delivery of a message.
    MessageDelivered {
        /// Id of the delivered message.
        message_id: MessageId,
    },
    /// The recipient read a message.
    MessageRead {
        /// Id of the read message.
        message_id: MessageId,
    },
}

/// Frames a client sends to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    /// Send a chat message into the bound room.
    #[serde(rename = "send_message")]
    SendMessage {
        /// The message text.
        message: String,
        /// Client-provisional message id, echoed back in delivery receipts.
        message_id: MessageId,
        /// Sender's display name.
        author_full_name: String,
    },
}

/// Decodes an inbound frame from its JSON text.
///
/// Unrecognized `type` values and untagged frames fall through to the
/// new-message path, matching what deployed backends emit.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the text is not valid JSON, or
/// [`CodecError::MissingField`] if a required field is absent for the
/// frame's type.
pub fn decode(text: &str) -> Result<InboundFrame, CodecError> {
    let raw: RawFrame = serde_json::from_str(text)?;

    match raw.kind.as_deref() {
        Some("message_delivered") => Ok(InboundFrame::MessageDelivered {
            message_id: raw
                .message_id
                .ok_or(CodecError::MissingField("message_id"))?,
        }),
        Some("message_read") => Ok(InboundFrame::MessageRead {
            message_id: raw
                .message_id
                .ok_or(CodecError::MissingField("message_id"))?,
        }),
        _ => {
            let content = raw.message.ok_or(CodecError::MissingField("message"))?;
            let (object_id, object_name) = match raw.author {
                Some(AuthorField::Object { id, pk, full_name }) => (id.or(pk), full_name),
                Some(AuthorField::Name(name)) => (None, Some(name)),
                None => (None, None),
            };
            Ok(InboundFrame::NewMessage(NewMessage {
                message_id: raw.message_id,
                content,
                author_id: raw.author_id.or(object_id).or(raw.user_id),
                author_name: object_name.or(raw.author_full_name),
                timestamp: raw.timestamp,
            }))
        }
    }
}

/// Encodes an outbound frame as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
pub fn encode(frame: &OutboundFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}
