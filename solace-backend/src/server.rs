//! Backend HTTP and WebSocket surface.
//!
//! Routes:
//!
//! | Method | Path                     | Purpose                           |
//! |--------|--------------------------|-----------------------------------|
//! | POST   | `/chat/start-direct/`    | Create or resume a direct room    |
//! | GET    | `/chat/{room}/messages/` | Full message history              |
//! | POST   | `/chat/{room}/messages/` | Send a message over HTTP          |
//! | POST   | `/chat/{room}/mark-read/`| Mark peer messages read           |
//! | GET    | `/ws/chat/{room}/`       | Live socket for the room          |
//!
//! Authentication is a development stub: the bearer token (or the socket's
//! `token` query parameter) is `user-id` or `user-id:display-name`, taken
//! at face value. Socket sends are stored, broadcast to every connection in
//! the room as `new_message`, and acknowledged to the sender with
//! `message_delivered`. Read receipts fan out as `message_read` frames.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use solace_proto::message::{MAX_MESSAGE_LEN, Message, MessageId, Origin, RoomId, UserId};

use crate::rooms::{ConnId, RoomRegistry};
use crate::store::HistoryStore;

/// Shared backend state: message history plus the live-socket registry.
pub struct BackendState {
    /// Per-room message logs and the direct-room directory.
    pub store: HistoryStore,
    /// Live WebSocket connections grouped by room.
    pub rooms: RoomRegistry,
}

impl Default for BackendState {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendState {
    /// Creates empty backend state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: HistoryStore::new(),
            rooms: RoomRegistry::new(),
        }
    }
}

/// The caller's identity as carried by the stub token.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The user id half of the token.
    pub user_id: UserId,
    /// Display name, when the token carries one.
    pub display_name: Option<String>,
}

/// Parses a stub token of the form `user-id` or `user-id:display-name`.
fn parse_token(token: &str) -> Option<Identity> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match token.split_once(':') {
        Some((id, name)) => {
            if id.is_empty() {
                return None;
            }
            Some(Identity {
                user_id: UserId::new(id),
                display_name: (!name.is_empty()).then(|| name.to_string()),
            })
        }
        None => Some(Identity {
            user_id: UserId::new(token),
            display_name: None,
        }),
    }
}

/// Extracts the caller's identity from an `Authorization: Bearer` header.
fn bearer_identity(headers: &HeaderMap) -> Option<Identity> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    parse_token(value.strip_prefix("Bearer ")?)
}

/// JSON error body in the shape clients parse: `{"error": "..."}`.
fn error_body(status: StatusCode, reason: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": reason })))
}

type ApiResult<T> = Result<T, (StatusCode, Json<serde_json::Value>)>;

/// Body of `POST /chat/start-direct/`.
#[derive(Debug, Deserialize)]
struct StartDirectRequest {
    recipient_id: UserId,
}

/// Body of `POST /chat/{room}/messages/`.
#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    message: String,
}

/// Query parameters of the socket route.
#[derive(Debug, Deserialize)]
struct SocketParams {
    #[serde(default)]
    token: Option<String>,
}

async fn start_direct(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<StartDirectRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let identity = bearer_identity(&headers)
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "missing or invalid token"))?;

    let room = state
        .store
        .start_direct(&identity.user_id, &body.recipient_id)
        .await;
    tracing::info!(room = %room, user = %identity.user_id, "direct chat started");
    Ok(Json(serde_json::json!({ "id": room })))
}

async fn get_messages(
    State(state): State<Arc<BackendState>>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Message>>> {
    bearer_identity(&headers)
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "missing or invalid token"))?;

    let room = RoomId::new(room);
    let history = state
        .store
        .history(&room)
        .await
        .ok_or_else(|| error_body(StatusCode::NOT_FOUND, "room not found"))?;
    Ok(Json(history))
}

async fn post_message(
    State(state): State<Arc<BackendState>>,
    Path(room): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let identity = bearer_identity(&headers)
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "missing or invalid token"))?;

    if body.message.trim().is_empty() {
        return Err(error_body(StatusCode::BAD_REQUEST, "message is empty"));
    }
    if body.message.chars().count() > MAX_MESSAGE_LEN {
        return Err(error_body(StatusCode::BAD_REQUEST, "message is too long"));
    }

    let room = RoomId::new(room);
    if !state.store.room_exists(&room).await {
        return Err(error_body(StatusCode::NOT_FOUND, "room not found"));
    }

    let message = state
        .store
        .append_text(
            &room,
            &body.message,
            identity.user_id.clone(),
            identity.display_name.clone(),
        )
        .await;
    state
        .rooms
        .broadcast(&room, &new_message_frame(&message))
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<Arc<BackendState>>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let identity = bearer_identity(&headers)
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "missing or invalid token"))?;

    let room = RoomId::new(room);
    if !state.store.room_exists(&room).await {
        return Err(error_body(StatusCode::NOT_FOUND, "room not found"));
    }

    let flipped = state.store.mark_read(&room, &identity.user_id).await;
    for message_id in &flipped {
        let frame = serde_json::json!({
            "type": "message_read",
            "message_id": message_id,
        });
        state
            .rooms
            .broadcast(&room, &WsMessage::Text(frame.to_string().into()))
            .await;
    }

    Ok(Json(serde_json::json!({ "updated": flipped.len() })))
}

/// Upgrades a socket connection after validating the stub token.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<BackendState>>,
) -> Response {
    let Some(identity) = params.token.as_deref().and_then(parse_token) else {
        tracing::warn!(room = %room, "socket rejected: missing or invalid token");
        return StatusCode::FORBIDDEN.into_response();
    };

    let room = RoomId::new(room);
    if !state.store.room_exists(&room).await {
        return StatusCode::NOT_FOUND.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, room, identity, state))
}

/// Runs one room socket until either side drops.
///
/// A writer task forwards frames from the registry channel; the reader loop
/// handles `send_message` frames from the client. The connection is
/// unregistered when either half finishes.
async fn handle_socket(
    socket: WebSocket,
    room: RoomId,
    identity: Identity,
    state: Arc<BackendState>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let conn = state.rooms.register(&room, tx).await;

    tracing::info!(room = %room, user = %identity.user_id, conn = conn, "socket joined room");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let reader_room = room.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_client_frame(&reader_state, &reader_room, conn, &identity, text.as_ref())
                        .await;
                }
                WsMessage::Close(_) => break,
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    state.rooms.unregister(&room, conn).await;
    tracing::info!(room = %room, conn = conn, "socket left room");
}

/// A frame received from a client socket.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_id: Option<MessageId>,
    #[serde(default)]
    author_full_name: Option<String>,
}

async fn handle_client_frame(
    state: &Arc<BackendState>,
    room: &RoomId,
    conn: ConnId,
    identity: &Identity,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(room = %room, conn = conn, err = %e, "malformed client frame");
            return;
        }
    };

    if frame.kind != "send_message" {
        tracing::warn!(room = %room, kind = %frame.kind, "unexpected client frame type");
        return;
    }
    let Some(content) = frame.message else {
        tracing::warn!(room = %room, conn = conn, "send_message frame without text");
        return;
    };
    if content.trim().is_empty() || content.chars().count() > MAX_MESSAGE_LEN {
        tracing::warn!(room = %room, conn = conn, "rejecting invalid message text");
        return;
    }

    let message = Message {
        id: frame.message_id.unwrap_or_else(MessageId::client_generated),
        content,
        author_id: Some(identity.user_id.clone()),
        author_full_name: frame
            .author_full_name
            .or_else(|| identity.display_name.clone()),
        timestamp: Utc::now(),
        is_delivered: true,
        is_read: false,
        origin: Origin::Remote,
    };
    state.store.append(room, message.clone()).await;

    state.rooms.broadcast(room, &new_message_frame(&message)).await;

    let receipt = serde_json::json!({
        "type": "message_delivered",
        "message_id": message.id,
    });
    state
        .rooms
        .send_to(room, conn, WsMessage::Text(receipt.to_string().into()))
        .await;
}

/// Builds the `new_message` broadcast frame for a stored message.
fn new_message_frame(message: &Message) -> WsMessage {
    let frame = serde_json::json!({
        "type": "new_message",
        "message_id": message.id,
        "message": message.content,
        "author_id": message.author_id,
        "author_full_name": message.author_full_name,
        "timestamp": message.timestamp,
    });
    WsMessage::Text(frame.to_string().into())
}

/// Builds the backend router over shared state.
fn router(state: Arc<BackendState>) -> axum::Router {
    axum::Router::new()
        .route("/chat/start-direct/", post(start_direct))
        .route("/chat/{room}/messages/", get(get_messages).post(post_message))
        .route("/chat/{room}/mark-read/", post(mark_read))
        .route("/ws/chat/{room}/", get(ws_handler))
        .with_state(state)
}

/// Starts the backend on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    start_server_with_state(addr, Arc::new(BackendState::new())).await
}

/// Starts the backend with pre-seeded [`BackendState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BackendState>,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(err = %e, "backend server error");
        }
    });

    Ok((bound_addr, handle))
}
