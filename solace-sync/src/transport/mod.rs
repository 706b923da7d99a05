//! Transport layer abstraction for the sync engine.
//!
//! Defines the [`Connector`] trait that socket implementations must satisfy.
//! Concrete implementations include:
//! - [`ws::WsConnector`]: WebSocket connection to the chat backend
//! - [`loopback::LoopbackConnector`]: in-process channel-based connector for testing

pub mod loopback;
pub mod ws;

use solace_proto::frame::{InboundFrame, OutboundFrame};
use solace_proto::message::RoomId;

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// No socket is currently connected; the caller should use the HTTP path.
    #[error("no active socket connection")]
    NotConnected,

    /// The backend endpoint cannot be reached.
    #[error("backend is unreachable: {0}")]
    Unreachable(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write half of a room socket.
pub trait FrameSink: Send {
    /// Transmit an outbound frame.
    ///
    /// Returns `Ok(())` when the frame has been handed off to the underlying
    /// socket. This does NOT guarantee delivery; delivery is confirmed by a
    /// `message_delivered` frame from the backend.
    fn send(
        &mut self,
        frame: &OutboundFrame,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Read half of a room socket.
pub trait FrameStream: Send {
    /// Receive the next decoded inbound frame.
    ///
    /// Returns `None` when the socket closed cleanly, and `Some(Err(_))` on a
    /// transport failure. Malformed frames are logged and skipped inside the
    /// implementation; they never terminate the stream.
    fn next_frame(
        &mut self,
    ) -> impl std::future::Future<Output = Option<Result<InboundFrame, TransportError>>> + Send;
}

/// Factory for room sockets.
///
/// The connection manager calls [`Connector::connect`] on every bind and
/// reconnect attempt, so implementations must be reusable.
pub trait Connector: Send + Sync + 'static {
    /// Write half produced by a successful connect.
    type Sink: FrameSink + 'static;
    /// Read half produced by a successful connect.
    type Stream: FrameStream + 'static;

    /// Open a socket into the given room, authenticated by `token`.
    fn connect(
        &self,
        room: &RoomId,
        token: &str,
    ) -> impl std::future::Future<Output = Result<(Self::Sink, Self::Stream), TransportError>> + Send;
}
