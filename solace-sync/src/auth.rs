//! Session identity seam.
//!
//! The engine never manages credentials itself; the embedding app supplies
//! them through [`AuthProvider`]. A missing access token is the only fatal
//! condition in the engine; everything else degrades.

use solace_proto::message::UserId;

/// Supplies the local user's credentials and identity.
pub trait AuthProvider: Send + Sync {
    /// The current access token, if the user is signed in.
    fn access_token(&self) -> Option<String>;

    /// The local user's id, used to recognize echoes of our own messages.
    fn user_id(&self) -> Option<UserId>;

    /// The local user's display name; legacy fallback for echo detection
    /// and the name attached to outbound messages.
    fn display_name(&self) -> Option<String>;
}

/// Fixed credentials, for tests and simple embeddings.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    token: Option<String>,
    user_id: Option<UserId>,
    display_name: Option<String>,
}

impl StaticAuth {
    /// Creates a signed-in identity.
    pub fn new(
        token: impl Into<String>,
        user_id: UserId,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            token: Some(token.into()),
            user_id: Some(user_id),
            display_name: Some(display_name.into()),
        }
    }

    /// Creates a signed-out identity with no token.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            token: None,
            user_id: None,
            display_name: None,
        }
    }
}

impl AuthProvider for StaticAuth {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }
}
