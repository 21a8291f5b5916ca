use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// A connected WebSocket — delivers whole text messages in order.
///
/// Wraps either a client-initiated stream (from [`connect`]) or a
/// server-accepted stream (from [`crate::WsListener::accept`]).
pub struct WsConnection {
    inner: WsConnectionInner,
}

enum WsConnectionInner {
    Client(WebSocketStream<MaybeTlsStream<TcpStream>>),
    Server(WebSocketStream<TcpStream>),
}

impl WsConnection {
    pub(crate) fn from_client(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            inner: WsConnectionInner::Client(stream),
        }
    }

    pub(crate) fn from_server(stream: WebSocketStream<TcpStream>) -> Self {
        Self {
            inner: WsConnectionInner::Server(stream),
        }
    }

    /// Send one text message.
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        let message = Message::Text(text.into());
        match &mut self.inner {
            WsConnectionInner::Client(stream) => stream.send(message).await?,
            WsConnectionInner::Server(stream) => stream.send(message).await?,
        }
        Ok(())
    }

    /// Receive the next text message.
    ///
    /// Returns `Ok(None)` once the connection closes cleanly. Pings are
    /// answered internally; binary frames are not part of the protocol and
    /// are dropped with a warning.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            let next = match &mut self.inner {
                WsConnectionInner::Client(stream) => stream.next().await,
                WsConnectionInner::Server(stream) => stream.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    warn!(len = data.len(), "dropping unexpected binary frame");
                    continue;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let pong = Message::Pong(payload);
                    let result = match &mut self.inner {
                        WsConnectionInner::Client(stream) => stream.send(pong).await,
                        WsConnectionInner::Server(stream) => stream.send(pong).await,
                    };
                    if let Err(err) = result {
                        return Err(err.into());
                    }
                    continue;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed connection");
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(err)) => return Err(err.into()),
                None => return Ok(None),
            }
        }
    }

    /// Close the connection, flushing a close frame to the peer.
    pub async fn close(&mut self) -> Result<()> {
        let result = match &mut self.inner {
            WsConnectionInner::Client(stream) => stream.close(None).await,
            WsConnectionInner::Server(stream) => stream.close(None).await,
        };
        match result {
            Ok(()) => Ok(()),
            // Already closed is fine.
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            WsConnectionInner::Client(_) => "client",
            WsConnectionInner::Server(_) => "server",
        };
        f.debug_struct("WsConnection").field("type", &kind).finish()
    }
}

/// Connect to a listening peer at a `ws://` URL.
pub async fn connect(url: &str) -> Result<WsConnection> {
    let (stream, response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| TransportError::Connect {
                url: url.to_string(),
                source: err,
            })?;
    debug!(url, status = %response.status(), "websocket connected");
    Ok(WsConnection::from_client(stream))
}
