//! REST client for the chat backend.
//!
//! The engine reaches the backend's HTTP surface through the [`BackendApi`]
//! trait: room setup, message history, the HTTP send fallback, and read
//! receipts. [`HttpBackend`] is the real implementation; [`StubApi`] is an
//! in-memory double for tests.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use solace_proto::message::{Message, RoomId, UserId};

use crate::auth::AuthProvider;

/// Errors from backend REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (network failure, timeout).
    #[error("request failed: {0}")]
    Request(String),
    /// The backend answered with an error status.
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The response body did not match the expected shape.
    #[error("malformed backend response: {0}")]
    Decode(String),
}

/// Async client for the chat backend's REST endpoints.
pub trait BackendApi: Send + Sync {
    /// Start (or resume) a direct chat with the given user, returning the
    /// room id.
    fn start_direct_chat(
        &self,
        recipient: &UserId,
    ) -> impl std::future::Future<Output = Result<RoomId, ApiError>> + Send;

    /// Fetch the full message history of a room.
    fn get_messages(
        &self,
        room: &RoomId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, ApiError>> + Send;

    /// Send a message over HTTP; the fallback path when no socket is up.
    fn send_message(
        &self,
        room: &RoomId,
        content: &str,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;

    /// Mark every message in the room as read by the local user.
    fn mark_messages_as_read(
        &self,
        room: &RoomId,
    ) -> impl std::future::Future<Output = Result<(), ApiError>> + Send;
}

impl<T: BackendApi> BackendApi for Arc<T> {
    async fn start_direct_chat(&self, recipient: &UserId) -> Result<RoomId, ApiError> {
        (**self).start_direct_chat(recipient).await
    }

    async fn get_messages(&self, room: &RoomId) -> Result<Vec<Message>, ApiError> {
        (**self).get_messages(room).await
    }

    async fn send_message(&self, room: &RoomId, content: &str) -> Result<(), ApiError> {
        (**self).send_message(room, content).await
    }

    async fn mark_messages_as_read(&self, room: &RoomId) -> Result<(), ApiError> {
        (**self).mark_messages_as_read(room).await
    }
}

/// Response body of the start-direct endpoint.
#[derive(Debug, Deserialize)]
struct StartChatResponse {
    id: RoomId,
}

/// Error body the backend attaches to non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`BackendApi`] implementation over HTTP with bearer-token auth.
pub struct HttpBackend<P> {
    client: reqwest::Client,
    base_url: Url,
    auth: Arc<P>,
}

impl<P: AuthProvider> HttpBackend<P> {
    /// Creates a client for the given backend base URL.
    pub fn new(base_url: Url, auth: Arc<P>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Request(format!("invalid endpoint {path}: {e}")))
    }

    /// Attaches the bearer token when one is available.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and maps error statuses onto [`ApiError::Rejected`].
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let reason = body
            .message
            .or(body.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(ApiError::Rejected(reason))
    }
}

impl<P: AuthProvider> BackendApi for HttpBackend<P> {
    async fn start_direct_chat(&self, recipient: &UserId) -> Result<RoomId, ApiError> {
        let url = self.endpoint("chat/start-direct/")?;
        let body = serde_json::json!({ "recipient_id": recipient });
        let response = self.execute(self.client.post(url).json(&body)).await?;
        let parsed: StartChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parsed.id)
    }

    async fn get_messages(&self, room: &RoomId) -> Result<Vec<Message>, ApiError> {
        let url = self.endpoint(&format!("chat/{room}/messages/"))?;
        let response = self.execute(self.client.get(url)).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_message(&self, room: &RoomId, content: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("chat/{room}/messages/"))?;
        let body = serde_json::json!({ "message": content });
        self.execute(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn mark_messages_as_read(&self, room: &RoomId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("chat/{room}/mark-read/"))?;
        self.execute(self.client.post(url)).await?;
        Ok(())
    }
}

/// Scriptable in-memory [`BackendApi`] double.
///
/// Holds one room's worth of server-side state. Tests can seed history,
/// inject messages between polls, and force send failures to exercise the
/// rollback path.
pub struct StubApi {
    state: parking_lot::Mutex<StubState>,
}

struct StubState {
    room: RoomId,
    messages: Vec<Message>,
    next_id: u64,
    fail_sends: bool,
    sent: Vec<String>,
    mark_read_calls: u32,
}

impl StubApi {
    /// Creates a stub backend serving the given room.
    #[must_use]
    pub fn new(room: RoomId) -> Self {
        Self {
            state: parking_lot::Mutex::new(StubState {
                room,
                messages: Vec::new(),
                next_id: 1,
                fail_sends: false,
                sent: Vec::new(),
                mark_read_calls: 0,
            }),
        }
    }

    /// Replaces the server-side history.
    pub fn seed(&self, messages: Vec<Message>) {
        self.state.lock().messages = messages;
    }

    /// Appends a message to the server-side history, as a peer would.
    pub fn push_message(&self, message: Message) {
        self.state.lock().messages.push(message);
    }

    /// Makes subsequent sends fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Message texts accepted through [`BackendApi::send_message`].
    #[must_use]
    pub fn sent_messages(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Number of mark-read calls observed.
    #[must_use]
    pub fn mark_read_calls(&self) -> u32 {
        self.state.lock().mark_read_calls
    }
}

impl BackendApi for StubApi {
    async fn start_direct_chat(&self, _recipient: &UserId) -> Result<RoomId, ApiError> {
        Ok(self.state.lock().room.clone())
    }

    async fn get_messages(&self, room: &RoomId) -> Result<Vec<Message>, ApiError> {
        let state = self.state.lock();
        if *room == state.room {
            Ok(state.messages.clone())
        } else {
            Err(ApiError::Rejected(format!("unknown room {room}")))
        }
    }

    async fn send_message(&self, _room: &RoomId, content: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(ApiError::Rejected("sending disabled".into()));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.sent.push(content.to_string());
        state.messages.push(Message {
            id: solace_proto::message::MessageId::new(format!("srv-{id}")),
            content: content.to_string(),
            author_id: None,
            author_full_name: None,
            timestamp: chrono::Utc::now(),
            is_delivered: true,
            is_read: false,
            origin: solace_proto::message::Origin::Remote,
        });
        Ok(())
    }

    async fn mark_messages_as_read(&self, _room: &RoomId) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.mark_read_calls += 1;
        for message in &mut state.messages {
            message.is_read = true;
        }
        Ok(())
    }
}
