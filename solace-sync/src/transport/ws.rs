//! WebSocket connector for the chat backend.
//!
//! Opens a socket at `{base}/ws/chat/{room}/?token={token}` and adapts the
//! tungstenite stream to the [`Connector`] traits. Frames are JSON text
//! messages; malformed frames are logged and skipped without terminating
//! the stream.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use solace_proto::frame::{self, InboundFrame, OutboundFrame};
use solace_proto::message::RoomId;

use super::{Connector, FrameSink, FrameStream, TransportError};

/// Type alias for the write half of a WebSocket connection.
type WsWriteHalf = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReadHalf =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket connector targeting a chat backend instance.
///
/// Holds only the backend base URL; each [`Connector::connect`] call opens a
/// fresh socket, so the same connector serves every reconnect attempt.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// Backend base URL (`ws://` or `wss://`).
    base_url: Url,
}

impl WsConnector {
    /// Creates a connector for the given backend base URL.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Builds the room socket URL with the auth token as a query parameter.
    fn room_url(&self, room: &RoomId, token: &str) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&format!("ws/chat/{room}/"))
            .map_err(|e| TransportError::Unreachable(format!("invalid room URL: {e}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Write half of a backend room socket.
pub struct WsFrameSink {
    writer: WsWriteHalf,
}

/// Read half of a backend room socket.
pub struct WsFrameStream {
    reader: WsReadHalf,
}

impl Connector for WsConnector {
    type Sink = WsFrameSink;
    type Stream = WsFrameStream;

    /// Open a socket into the given room with a 10s connect timeout.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the connection attempt times out.
    /// - [`TransportError::Unreachable`] if the backend cannot be reached.
    /// - [`TransportError::Io`] for TLS failures or HTTP-level rejections
    ///   (e.g. an invalid token).
    async fn connect(
        &self,
        room: &RoomId,
        token: &str,
    ) -> Result<(WsFrameSink, WsFrameStream), TransportError> {
        let url = self.room_url(room, token)?;

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    tracing::warn!(room = %room, "socket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(room = %room, err = %e, "socket connect failed");
                    map_ws_connect_error(e)
                })?;

        let (writer, reader) = ws_stream.split();
        Ok((WsFrameSink { writer }, WsFrameStream { reader }))
    }
}

impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), TransportError> {
        let text = frame::encode(frame)
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
        self.writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "socket send failed");
                TransportError::ConnectionClosed
            })
    }
}

impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        while let Some(msg_result) = self.reader.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match frame::decode(&text) {
                    Ok(inbound) => return Some(Ok(inbound)),
                    Err(e) => {
                        // Malformed frame: log and skip, don't disconnect.
                        tracing::warn!(err = %e, "malformed socket frame, skipping");
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("socket closed by backend");
                    return None;
                }
                Ok(Message::Binary(_)) => {
                    tracing::debug!("ignoring unexpected binary frame");
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    // Control frames are handled by tungstenite.
                }
                Err(e) => {
                    tracing::warn!(err = %e, "socket read error");
                    return Some(Err(TransportError::Io(std::io::Error::other(
                        e.to_string(),
                    ))));
                }
            }
        }
        None
    }
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            // DNS/network failures surface as io errors.
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable("connection refused".into())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Tls(_) => TransportError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "backend HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!("connection error: {other}"))),
    }
}
