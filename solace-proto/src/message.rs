//! Message records and identifiers for the Solace chat protocol.
//!
//! These types mirror the JSON shapes the backend emits over both the REST
//! message endpoints and the WebSocket event stream. The backend is loose
//! about identifier types (integer ids from the database, stringly-typed
//! ids from clients), so every identifier newtype accepts either a JSON
//! number or a JSON string and canonicalizes it to a string.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Maximum allowed message length in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Visitor that accepts a JSON string or number and yields its string form.
struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a string or numeric identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

macro_rules! flexible_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from its string form.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the canonical string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(IdVisitor).map(Self)
            }
        }
    };
}

flexible_id! {
    /// Identifies a chat room (a direct conversation between two users).
    RoomId
}

flexible_id! {
    /// Identifies a user account.
    UserId
}

flexible_id! {
    /// Identifies a message.
    ///
    /// Server-assigned ids are database integers; client-generated ids are
    /// produced by [`MessageId::client_generated`] before the server has
    /// assigned one. Both canonicalize to strings so lookups and
    /// de-duplication compare a single representation.
    MessageId
}

impl MessageId {
    /// Creates a client-side provisional id for an optimistic message.
    ///
    /// The id is the current UNIX millisecond timestamp with a random
    /// six-digit fraction, which keeps provisional ids time-ordered and
    /// collision-free within a session.
    #[must_use]
    pub fn client_generated() -> Self {
        let millis = Utc::now().timestamp_millis();
        let frac: u32 = rand::rng().random_range(0..1_000_000);
        Self(format!("{millis}.{frac:06}"))
    }
}

/// Where a message entered the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// Appended optimistically by the local send path; not yet confirmed.
    Local,
    /// Fetched from the backend or delivered over the socket by a peer.
    #[default]
    Remote,
    /// Originally local, since confirmed by a server echo or re-fetch.
    Confirmed,
}

/// A chat message as stored and rendered by a client.
///
/// The serialized form matches the backend's REST message records. The
/// `origin` tag is client-side bookkeeping and never crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier (server-assigned or client-provisional).
    pub id: MessageId,
    /// The message text.
    pub content: String,
    /// Author's user id, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    /// Author's display name; legacy identity fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_full_name: Option<String>,
    /// Creation time, ISO-8601 on the wire.
    pub timestamp: DateTime<Utc>,
    /// Whether the backend has confirmed delivery.
    #[serde(default)]
    pub is_delivered: bool,
    /// Whether the recipient has read the message.
    #[serde(default)]
    pub is_read: bool,
    /// Client-side origin tag, never serialized.
    #[serde(skip)]
    pub origin: Origin,
}

/// Error returned when message content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty or whitespace-only.
    #[error("message content is empty")]
    Empty,
    /// Content exceeds the maximum allowed length.
    #[error("message too long ({len} chars, max {max})")]
    TooLong {
        /// Actual length in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
}

/// Validates message text for sending.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if the text is empty after trimming,
/// or [`ValidationError::TooLong`] if it exceeds [`MAX_MESSAGE_LEN`]
/// characters.
pub fn validate_content(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(ValidationError::TooLong {
            len,
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(())
}
