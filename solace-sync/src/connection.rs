//! Socket lifecycle management for a chat session.
//!
//! The connection manager owns at most one active link per session: a live
//! socket, a polling ticker, or a pending reconnect timer. All three live
//! in a single slot behind one mutex, so teardown is a single cancel path
//! regardless of which kind of link is active.
//!
//! Lifecycle: [`ConnectionManager::bind`] opens the socket and spawns a
//! reader task. A clean close schedules a reconnect after a fixed delay; a
//! connect failure or read error degrades the session to fixed-interval
//! polling. Both loops run until [`ConnectionManager::unbind`]. Every bind
//! and unbind bumps an epoch counter, and spawned timers re-check the epoch
//! before acting, so a stale reconnect can never revive a torn-down session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use solace_proto::frame::{InboundFrame, OutboundFrame};
use solace_proto::message::RoomId;

use crate::config::EngineConfig;
use crate::transport::{Connector, FrameSink, FrameStream, TransportError};

/// Reason the session is running in a reduced mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedMode {
    /// Fetching over HTTP on a fixed interval instead of a live socket.
    Polling,
}

/// Observable connection state of the bound session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link is active.
    #[default]
    Disconnected,
    /// A socket connect is in flight.
    Connecting,
    /// The socket is live.
    Connected,
    /// The socket is unavailable; a fallback mechanism is active.
    Degraded(DegradedMode),
    /// The session was closed and will not reconnect.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Degraded(DegradedMode::Polling) => write!(f, "degraded (polling)"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Events the active link feeds into the session's event loop.
#[derive(Debug)]
pub enum LinkEvent {
    /// A decoded frame arrived over the socket.
    Frame(InboundFrame),
    /// The polling fallback is due for a fetch.
    PollTick,
}

/// The one live link of a session.
enum ActiveLink<S> {
    /// Live socket: write half plus the reader task.
    Socket {
        sink: S,
        reader: JoinHandle<()>,
    },
    /// Polling fallback ticker.
    Poll { ticker: JoinHandle<()> },
    /// Pending reconnect timer after a clean close.
    Retry { timer: JoinHandle<()> },
}

impl<S> ActiveLink<S> {
    /// Tears the link down. Exactly one handle is cancelled, whichever
    /// kind the link is.
    fn cancel(self) {
        match self {
            Self::Socket { reader, .. } => reader.abort(),
            Self::Poll { ticker } => ticker.abort(),
            Self::Retry { timer } => timer.abort(),
        }
    }
}

/// Why the reader task stopped.
enum LinkEnd {
    /// The backend closed the socket cleanly.
    Closed,
    /// The socket failed mid-stream.
    Errored,
}

/// The link slot; epoch changes on every external bind/unbind.
struct LinkSlot<S> {
    epoch: u64,
    active: Option<ActiveLink<S>>,
}

struct Inner<C: Connector> {
    connector: C,
    config: EngineConfig,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<LinkEvent>,
    slot: Mutex<LinkSlot<C::Sink>>,
}

/// Manages the single active link of a chat session.
pub struct ConnectionManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager that reports link events into `events`.
    pub fn new(connector: C, config: EngineConfig, events: mpsc::Sender<LinkEvent>) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                state: state_tx,
                events,
                slot: Mutex::new(LinkSlot {
                    epoch: 0,
                    active: None,
                }),
            }),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch channel for state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Binds the session to a room: tears down any existing link, then
    /// connects the socket.
    ///
    /// Never fails outright: a connect failure degrades the session to
    /// polling, observable via [`ConnectionManager::subscribe`].
    pub async fn bind(&self, room: RoomId, token: String) {
        let mut slot = self.inner.slot.lock().await;
        slot.epoch += 1;
        if let Some(link) = slot.active.take() {
            link.cancel();
        }
        establish(&self.inner, &mut slot, room, token).await;
    }

    /// Transmits a frame over the live socket.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when no socket is live (the
    /// caller should fall back to the HTTP send path), or the underlying
    /// send error when the socket fails mid-write.
    pub async fn send(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let mut slot = self.inner.slot.lock().await;
        match slot.active.as_mut() {
            Some(ActiveLink::Socket { sink, .. }) => sink.send(frame).await,
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Tears down the active link, whichever kind it is.
    ///
    /// Idempotent and safe in every state; a pending reconnect timer or
    /// polling ticker is cancelled along with a live socket.
    pub async fn unbind(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.epoch += 1;
        if let Some(link) = slot.active.take() {
            link.cancel();
        }
        if *self.inner.state.borrow() != ConnectionState::Closed {
            self.inner.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Unbinds and marks the session closed for good.
    pub async fn close(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.epoch += 1;
        if let Some(link) = slot.active.take() {
            link.cancel();
        }
        self.inner.state.send_replace(ConnectionState::Closed);
    }
}

/// Connects the socket and installs the resulting link into the slot.
///
/// Called with the slot lock held, from both `bind` and the reconnect
/// timer. On connect failure the session degrades to polling.
async fn establish<C: Connector>(
    inner: &Arc<Inner<C>>,
    slot: &mut LinkSlot<C::Sink>,
    room: RoomId,
    token: String,
) {
    let epoch = slot.epoch;
    inner.state.send_replace(ConnectionState::Connecting);

    match inner.connector.connect(&room, &token).await {
        Ok((sink, stream)) => {
            tracing::info!(room = %room, "socket connected");
            let reader = tokio::spawn(reader_task(Arc::clone(inner), stream, epoch, room, token));
            slot.active = Some(ActiveLink::Socket { sink, reader });
            inner.state.send_replace(ConnectionState::Connected);
        }
        Err(e) => {
            tracing::warn!(room = %room, err = %e, "socket connect failed, degrading to polling");
            install_poll(inner, slot);
        }
    }
}

/// Installs the polling ticker and flips the state to degraded.
fn install_poll<C: Connector>(inner: &Arc<Inner<C>>, slot: &mut LinkSlot<C::Sink>) {
    let ticker = tokio::spawn(poll_task(
        inner.events.clone(),
        inner.config.poll_interval,
    ));
    slot.active = Some(ActiveLink::Poll { ticker });
    inner
        .state
        .send_replace(ConnectionState::Degraded(DegradedMode::Polling));
}

/// Reader task for one socket.
///
/// Forwards decoded frames into the link event channel. On a read error
/// the session degrades to polling; on a clean close it schedules a
/// reconnect. Either transition only happens if the epoch is still
/// current; otherwise the session was rebound or torn down while this
/// reader was draining, and it must not touch the slot.
async fn reader_task<C: Connector>(
    inner: Arc<Inner<C>>,
    mut stream: C::Stream,
    epoch: u64,
    room: RoomId,
    token: String,
) {
    let end = loop {
        match stream.next_frame().await {
            Some(Ok(frame)) => {
                if inner.events.send(LinkEvent::Frame(frame)).await.is_err() {
                    // Event loop dropped; the session is going away.
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(room = %room, err = %e, "socket read error");
                break LinkEnd::Errored;
            }
            None => {
                tracing::info!(room = %room, "socket closed");
                break LinkEnd::Closed;
            }
        }
    };

    let mut slot = inner.slot.lock().await;
    if slot.epoch != epoch {
        return;
    }
    // Dropping the slot entry drops the sink; the reader handle is this
    // task, which returns right after.
    slot.active = None;

    match end {
        LinkEnd::Errored => install_poll(&inner, &mut slot),
        LinkEnd::Closed => {
            inner.state.send_replace(ConnectionState::Disconnected);
            let timer = tokio::spawn(retry_task(Arc::clone(&inner), epoch, room, token));
            slot.active = Some(ActiveLink::Retry { timer });
        }
    }
}

/// Emits a poll tick on the fixed interval until the session goes away.
async fn poll_task(events: mpsc::Sender<LinkEvent>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; consume it so
    // ticks land a full interval after degrading.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if events.send(LinkEvent::PollTick).await.is_err() {
            return;
        }
    }
}

/// Waits out the reconnect delay, then re-establishes the socket if the
/// session is still the same binding.
fn retry_task<C: Connector>(
    inner: Arc<Inner<C>>,
    epoch: u64,
    room: RoomId,
    token: String,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    // Boxed to break the `establish` -> `reader_task` -> `retry_task`
    // async recursion cycle so the futures can be proven `Send`.
    Box::pin(async move {
        tokio::time::sleep(inner.config.reconnect_delay).await;
        let mut slot = inner.slot.lock().await;
        if slot.epoch != epoch {
            // Rebound or unbound while we slept; a cancelled timer can also
            // lose the abort race and land here.
            return;
        }
        tracing::info!(room = %room, "attempting socket reconnect");
        slot.active = None;
        establish(&inner, &mut slot, room, token).await;
    })
}
