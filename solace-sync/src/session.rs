//! The session engine: one open chat conversation.
//!
//! [`SessionEngine`] composes the connection manager, the message store and
//! the reconciler behind a single handle. Opening a session seeds history
//! over REST and binds the socket; sending appends optimistically and rolls
//! back on failure; an internal pump task reduces link events (frames and
//! poll ticks) to store mutations and forwards them to the UI layer as
//! [`SessionEvent`]s.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use solace_proto::frame::OutboundFrame;
use solace_proto::message::{self, Message, MessageId, Origin, RoomId, UserId, ValidationError};

use crate::api::{ApiError, BackendApi};
use crate::auth::AuthProvider;
use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, ConnectionState, LinkEvent};
use crate::reconcile::{Mutation, Reconciler};
use crate::store::{AppendOutcome, DayGroup, MessageStore, StatusField};
use crate::transport::{Connector, TransportError};

/// Events delivered to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message entered the store (optimistic local send or remote frame).
    MessageAppended(Message),
    /// A status flag changed on an existing message.
    StatusChanged {
        /// The affected message.
        message_id: MessageId,
        /// Which flag changed.
        field: StatusField,
    },
    /// The store was replaced wholesale by a fetch (seed or poll).
    MessagesReloaded,
    /// The connection state changed.
    ConnectionChanged(ConnectionState),
}

/// Errors opening a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No access token is available; the session cannot start.
    #[error("no access token available")]
    AuthMissing,
    /// A backend call during session setup failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors sending a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message text failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// No conversation is open.
    #[error("no chat session is open")]
    NoSession,
    /// Both the socket and the HTTP fallback refused the message; the
    /// optimistic entry was rolled back.
    #[error("message could not be sent: {0}")]
    Failed(String),
}

/// State of the currently open conversation.
struct ChatSession {
    room: RoomId,
    reconciler: Reconciler,
}

struct EngineInner<C: Connector, A, P> {
    api: A,
    auth: P,
    conn: ConnectionManager<C>,
    store: parking_lot::Mutex<MessageStore>,
    session: parking_lot::Mutex<Option<ChatSession>>,
    events: mpsc::Sender<SessionEvent>,
}

/// Synchronization engine for one chat session at a time.
pub struct SessionEngine<C: Connector, A, P> {
    inner: Arc<EngineInner<C, A, P>>,
}

impl<C: Connector, A, P> Clone for SessionEngine<C, A, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, A, P> SessionEngine<C, A, P>
where
    C: Connector,
    A: BackendApi + 'static,
    P: AuthProvider + 'static,
{
    /// Creates the engine and the event stream the UI layer consumes.
    ///
    /// Spawns the internal pump task; the engine shuts down when the
    /// returned receiver is dropped.
    pub fn new(
        connector: C,
        api: A,
        auth: P,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (link_tx, link_rx) = mpsc::channel(config.link_buffer);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let conn = ConnectionManager::new(connector, config, link_tx);
        let state_rx = conn.subscribe();

        let inner = Arc::new(EngineInner {
            api,
            auth,
            conn,
            store: parking_lot::Mutex::new(MessageStore::new()),
            session: parking_lot::Mutex::new(None),
            events: event_tx.clone(),
        });

        tokio::spawn(pump(Arc::clone(&inner), link_rx));
        tokio::spawn(forward_connection_state(state_rx, event_tx));

        (Self { inner }, event_rx)
    }

    /// Opens a conversation with `recipient`.
    ///
    /// Resolves the room over REST, seeds the store with history, marks the
    /// room read, then binds the socket. Any previously open conversation
    /// is fully torn down first.
    ///
    /// # Errors
    ///
    /// [`SessionError::AuthMissing`] without an access token;
    /// [`SessionError::Api`] if room setup or the history fetch fails.
    pub async fn open(&self, recipient: &UserId) -> Result<RoomId, SessionError> {
        let token = self
            .inner
            .auth
            .access_token()
            .ok_or(SessionError::AuthMissing)?;

        // Tear down any previous conversation before touching the new one.
        self.inner.conn.unbind().await;
        *self.inner.session.lock() = None;
        self.inner.store.lock().clear();

        let room = self.inner.api.start_direct_chat(recipient).await?;
        let history = self.inner.api.get_messages(&room).await?;
        self.inner.store.lock().reload(history);
        emit(&self.inner.events, SessionEvent::MessagesReloaded);

        if let Err(e) = self.inner.api.mark_messages_as_read(&room).await {
            tracing::warn!(room = %room, err = %e, "failed to mark messages read");
        }

        let reconciler = Reconciler::new(self.inner.auth.user_id(), self.inner.auth.display_name());
        *self.inner.session.lock() = Some(ChatSession {
            room: room.clone(),
            reconciler,
        });

        self.inner.conn.bind(room.clone(), token).await;
        Ok(room)
    }

    /// Sends a message into the open conversation.
    ///
    /// The message is appended optimistically before transmission. It goes
    /// over the socket when one is live, otherwise over HTTP followed by a
    /// re-fetch. If both paths refuse it, the optimistic entry is removed
    /// and the error surfaced.
    ///
    /// # Errors
    ///
    /// [`SendError::Invalid`] for empty or oversized text,
    /// [`SendError::NoSession`] when nothing is open, and
    /// [`SendError::Failed`] after a rollback.
    pub async fn send_message(&self, text: &str) -> Result<MessageId, SendError> {
        message::validate_content(text)?;
        let room = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.room.clone())
            .ok_or(SendError::NoSession)?;

        let id = MessageId::client_generated();
        let author_name = self
            .inner
            .auth
            .display_name()
            .unwrap_or_else(|| "You".to_string());
        let optimistic = Message {
            id: id.clone(),
            content: text.to_string(),
            author_id: self.inner.auth.user_id(),
            author_full_name: Some(author_name.clone()),
            timestamp: Utc::now(),
            is_delivered: false,
            is_read: false,
            origin: Origin::Local,
        };
        self.inner.store.lock().append(optimistic.clone());
        emit(&self.inner.events, SessionEvent::MessageAppended(optimistic));

        let frame = OutboundFrame::SendMessage {
            message: text.to_string(),
            message_id: id.clone(),
            author_full_name: author_name,
        };
        let result = match self.inner.conn.send(&frame).await {
            Ok(()) => Ok(()),
            Err(TransportError::NotConnected) => self.send_over_http(&room, text).await,
            Err(e) => Err(e.to_string()),
        };

        if let Err(reason) = result {
            tracing::warn!(room = %room, err = %reason, "send failed, rolling back");
            self.inner.store.lock().remove(&id);
            return Err(SendError::Failed(reason));
        }
        Ok(id)
    }

    /// HTTP fallback send, followed by a full re-fetch.
    async fn send_over_http(&self, room: &RoomId, text: &str) -> Result<(), String> {
        self.inner
            .api
            .send_message(room, text)
            .await
            .map_err(|e| e.to_string())?;
        refresh(&self.inner, room).await;
        Ok(())
    }

    /// Closes the conversation: unbinds, clears the store, and stops
    /// reconnecting. Idempotent.
    pub async fn close(&self) {
        self.inner.conn.close().await;
        *self.inner.session.lock() = None;
        self.inner.store.lock().clear();
    }

    /// Snapshot of the stored messages in render order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.inner.store.lock().messages().to_vec()
    }

    /// Snapshot of the stored messages grouped by calendar day.
    #[must_use]
    pub fn day_groups(&self) -> Vec<DayGroup> {
        self.inner.store.lock().group_by_day()
    }

    /// The open room, if any.
    #[must_use]
    pub fn room(&self) -> Option<RoomId> {
        self.inner.session.lock().as_ref().map(|s| s.room.clone())
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.conn.state()
    }

    /// Watch channel for connection state transitions.
    #[must_use]
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.conn.subscribe()
    }
}

/// Forwards a session event without blocking the caller.
///
/// A full buffer drops the event with a warning; the store remains the
/// source of truth, so a UI that fell behind can resynchronize from it.
fn emit(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match events.try_send(event) {
        Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::warn!(?event, "session event buffer full, dropping event");
        }
    }
}

/// Pump task: reduces link events to store mutations and session events.
async fn pump<C, A, P>(inner: Arc<EngineInner<C, A, P>>, mut link_rx: mpsc::Receiver<LinkEvent>)
where
    C: Connector,
    A: BackendApi,
    P: AuthProvider,
{
    while let Some(event) = link_rx.recv().await {
        if inner.events.is_closed() {
            // UI layer went away; stop pumping.
            return;
        }
        match event {
            LinkEvent::Frame(frame) => {
                let mutation = inner
                    .session
                    .lock()
                    .as_ref()
                    .map(|s| s.reconciler.reconcile(frame));
                let Some(mutation) = mutation else {
                    // Frame raced a close; nothing to apply it to.
                    continue;
                };
                apply(&inner, mutation);
            }
            LinkEvent::PollTick => {
                let room = inner.session.lock().as_ref().map(|s| s.room.clone());
                if let Some(room) = room {
                    refresh(&inner, &room).await;
                }
            }
        }
    }
}

/// Applies a reconciled mutation to the store and reports it.
fn apply<C: Connector, A, P>(inner: &EngineInner<C, A, P>, mutation: Mutation) {
    match mutation {
        Mutation::Append(message) => {
            let outcome = inner.store.lock().append(message.clone());
            match outcome {
                AppendOutcome::Inserted => {
                    emit(&inner.events, SessionEvent::MessageAppended(message));
                }
                AppendOutcome::Confirmed => {
                    // An optimistic entry got its server echo through the
                    // id match rather than the identity check.
                    emit(
                        &inner.events,
                        SessionEvent::StatusChanged {
                            message_id: message.id,
                            field: StatusField::Delivered,
                        },
                    );
                }
                AppendOutcome::Duplicate => {}
            }
        }
        Mutation::SetStatus(message_id, field) => {
            if inner.store.lock().update_status(&message_id, field) {
                emit(
                    &inner.events,
                    SessionEvent::StatusChanged { message_id, field },
                );
            } else {
                tracing::debug!(message_id = %message_id, "status event for unknown message, ignoring");
            }
        }
        Mutation::Drop => {}
    }
}

/// Re-fetches the room over REST, replaces the store, and marks it read.
async fn refresh<C: Connector, A: BackendApi, P>(inner: &EngineInner<C, A, P>, room: &RoomId) {
    match inner.api.get_messages(room).await {
        Ok(messages) => {
            inner.store.lock().reload(messages);
            emit(&inner.events, SessionEvent::MessagesReloaded);
            if let Err(e) = inner.api.mark_messages_as_read(room).await {
                tracing::warn!(room = %room, err = %e, "failed to mark messages read");
            }
        }
        Err(e) => {
            tracing::warn!(room = %room, err = %e, "poll fetch failed");
        }
    }
}

/// Mirrors connection state changes into the session event stream.
async fn forward_connection_state(
    mut state_rx: watch::Receiver<ConnectionState>,
    events: mpsc::Sender<SessionEvent>,
) {
    while state_rx.changed().await.is_ok() {
        let state = *state_rx.borrow_and_update();
        if events.is_closed() {
            return;
        }
        emit(&events, SessionEvent::ConnectionChanged(state));
    }
}
