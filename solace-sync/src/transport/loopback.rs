//! Loopback connector for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to simulate the backend
//! side of a room socket. Created via [`pair`], which returns a connector
//! for the engine side and a receiver yielding one [`LoopbackPeer`] per
//! accepted connection, so tests can script the backend across reconnects.

use tokio::sync::{Mutex, mpsc};

use solace_proto::frame::{InboundFrame, OutboundFrame};
use solace_proto::message::RoomId;

use super::{Connector, FrameSink, FrameStream, TransportError};

/// In-process connector backed by `tokio::sync::mpsc` channels.
///
/// Every [`Connector::connect`] call produces a fresh channel pair and hands
/// the backend half to the listener returned by [`pair`]. Dropping that
/// listener makes subsequent connects fail, which simulates an unreachable
/// backend.
pub struct LoopbackConnector {
    /// Delivers the backend half of each accepted connection.
    accepts: mpsc::UnboundedSender<LoopbackPeer>,
}

/// The backend half of one accepted loopback connection.
pub struct LoopbackPeer {
    /// Room the client connected to.
    pub room: RoomId,
    /// Token the client presented.
    pub token: String,
    /// Frames the client sent.
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    /// Push frames (or a transport error) toward the client. Dropping this
    /// sender closes the socket cleanly from the client's point of view.
    pub inbound: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
}

/// Create a loopback connector and the listener for its accepted connections.
#[must_use]
pub fn pair() -> (LoopbackConnector, mpsc::UnboundedReceiver<LoopbackPeer>) {
    let (accepts_tx, accepts_rx) = mpsc::unbounded_channel();
    (
        LoopbackConnector {
            accepts: accepts_tx,
        },
        accepts_rx,
    )
}

/// Write half of a loopback connection.
pub struct LoopbackSink {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

/// Read half of a loopback connection.
pub struct LoopbackStream {
    rx: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
}

impl Connector for LoopbackConnector {
    type Sink = LoopbackSink;
    type Stream = LoopbackStream;

    async fn connect(
        &self,
        room: &RoomId,
        token: &str,
    ) -> Result<(LoopbackSink, LoopbackStream), TransportError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let peer = LoopbackPeer {
            room: room.clone(),
            token: token.to_string(),
            outbound: outbound_rx,
            inbound: inbound_tx,
        };
        self.accepts
            .send(peer)
            .map_err(|_| TransportError::Unreachable("loopback listener dropped".into()))?;

        Ok((
            LoopbackSink { tx: outbound_tx },
            LoopbackStream { rx: inbound_rx },
        ))
    }
}

impl FrameSink for LoopbackSink {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        self.tx
            .send(frame.clone())
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

impl FrameStream for LoopbackStream {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.rx.recv().await
    }
}

/// Connector whose connect attempts always fail.
///
/// Drives the degrade-to-polling path in tests.
pub struct FailingConnector {
    /// Records how many connect attempts were made.
    pub attempts: Mutex<u32>,
}

impl FailingConnector {
    /// Creates a connector that rejects every connect attempt.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: Mutex::const_new(0),
        }
    }
}

impl Default for FailingConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for FailingConnector {
    type Sink = LoopbackSink;
    type Stream = LoopbackStream;

    async fn connect(
        &self,
        room: &RoomId,
        _token: &str,
    ) -> Result<(LoopbackSink, LoopbackStream), TransportError> {
        *self.attempts.lock().await += 1;
        Err(TransportError::Unreachable(format!(
            "no route to room {room}"
        )))
    }
}
