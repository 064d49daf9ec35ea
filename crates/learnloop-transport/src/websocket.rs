//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};

use crate::{ConnectionId, Handshake, TransportConfig, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A WebSocket listener that accepts incoming TCP connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: TransportConfig,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(
        addr: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener, config })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection.
    ///
    /// The WebSocket upgrade is left to [`Incoming::upgrade`] so a slow
    /// client handshake never holds up the accept loop.
    pub async fn accept(&mut self) -> Result<Incoming, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%addr, "accepted TCP connection");
        Ok(Incoming {
            stream,
            addr,
            config: self.config.clone(),
        })
    }
}

/// A TCP connection that has not been upgraded yet.
pub struct Incoming {
    stream: TcpStream,
    addr: SocketAddr,
    config: TransportConfig,
}

impl Incoming {
    /// The remote peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs the WebSocket handshake.
    ///
    /// Requests without a `token` are refused with 401 and requests
    /// without a `sessionId` with 400; the upgrade never completes for
    /// them.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let mut handshake = None;
        let callback = |req: &Request, resp: Response| {
            match Handshake::from_query(req.uri().query()) {
                Ok(hs) => {
                    handshake = Some(hs);
                    Ok(resp)
                }
                Err(rejection) => {
                    let mut err =
                        ErrorResponse::new(Some(rejection.to_string()));
                    *err.status_mut() = StatusCode::from_u16(
                        rejection.status(),
                    )
                    .unwrap_or(StatusCode::BAD_REQUEST);
                    Err(err)
                }
            }
        };

        let ws = tokio_tungstenite::accept_hdr_async_with_config(
            self.stream,
            callback,
            Some(ws_config(&self.config)),
        )
        .await
        .map_err(|e| TransportError::UpgradeFailed(e.to_string()))?;

        let handshake = handshake.ok_or_else(|| {
            TransportError::UpgradeFailed("handshake not captured".into())
        })?;

        let conn = WebSocketConnection::new(ws, handshake);
        tracing::debug!(id = %conn.id, addr = %self.addr, "upgraded to WebSocket");
        Ok(conn)
    }
}

fn ws_config(config: &TransportConfig) -> WebSocketConfig {
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(config.max_message_size);
    ws.max_frame_size = Some(config.max_message_size);
    ws
}

// ---------------------------------------------------------------------------
// Connection and halves
// ---------------------------------------------------------------------------

/// An upgraded WebSocket connection, not yet split.
///
/// Generic over the byte stream so tests can run real framing over an
/// in-memory `tokio::io::duplex` pipe.
pub struct WebSocketConnection<S = TcpStream> {
    id: ConnectionId,
    handshake: Handshake,
    ws: WebSocketStream<S>,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-upgraded stream, assigning it a fresh id.
    pub fn new(ws: WebSocketStream<S>, handshake: Handshake) -> Self {
        Self {
            id: next_connection_id(),
            handshake,
            ws,
        }
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The addressing sent with the upgrade request.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Closes the connection with a policy-violation close frame.
    ///
    /// Used when the credential does not verify after the upgrade.
    pub async fn reject(mut self, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: String::from(reason).into(),
        };
        self.ws.close(Some(frame)).await.map_err(TransportError::SendFailed)
    }

    /// Splits into independent read and write halves.
    pub fn split(self) -> (WsReader<S>, WsWriter<S>) {
        let (sink, stream) = self.ws.split();
        (
            WsReader {
                id: self.id,
                stream,
            },
            WsWriter { id: self.id, sink },
        )
    }
}

/// What the reader yields for each inbound WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text or binary application message.
    Data(Vec<u8>),
    /// A ping or pong: proof the peer is alive, no payload for the app.
    KeepAlive,
}

/// The inbound half of a connection.
pub struct WsReader<S = TcpStream> {
    id: ConnectionId,
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next frame from the peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Messages
    /// over the configured size limit surface as
    /// [`TransportError::ReceiveFailed`].
    pub async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Frame::Data(text.as_bytes().to_vec())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Frame::Data(data.to_vec())));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    return Ok(Some(Frame::KeepAlive));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
    }
}

/// The outbound half of a connection.
pub struct WsWriter<S = TcpStream> {
    id: ConnectionId,
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The connection this half belongs to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a text message.
    pub async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::text(text.to_owned()))
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Sends a liveness ping.
    pub async fn ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Default::default()))
            .await
            .map_err(TransportError::SendFailed)
    }

    /// Sends a close frame and shuts the write side down.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(TransportError::SendFailed)?;
        self.sink.close().await.map_err(TransportError::SendFailed)
    }
}
