use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::ws::WsConnection;

/// A listening WebSocket endpoint.
///
/// Accepts TCP connections and upgrades each one through the WebSocket
/// handshake, yielding a [`WsConnection`] per remote peer.
pub struct WsListener {
    inner: TcpListener,
}

impl WsListener {
    /// Bind to a local address, e.g. `127.0.0.1:8080` or `127.0.0.1:0`.
    pub async fn bind(addr: &str) -> Result<Self> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        debug!(addr = %inner.local_addr()?, "websocket listener bound");
        Ok(Self { inner })
    }

    /// The address this listener is bound to (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept and upgrade the next incoming connection.
    pub async fn accept(&self) -> Result<WsConnection> {
        let (stream, remote) = self.inner.accept().await?;
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(TransportError::Accept)?;
        debug!(%remote, "websocket connection accepted");
        Ok(WsConnection::from_server(ws))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connect;

    #[tokio::test]
    async fn text_message_roundtrip() {
        let listener = WsListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let text = conn.recv_text().await.unwrap().unwrap();
            conn.send_text(text).await.unwrap();
        });

        let mut client = connect(&format!("ws://{addr}")).await.unwrap();
        client.send_text("hello, wsrpc!".to_string()).await.unwrap();
        let echoed = client.recv_text().await.unwrap().unwrap();
        assert_eq!(echoed, "hello, wsrpc!");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn recv_returns_none_after_close() {
        let listener = WsListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            conn.close().await.unwrap();
        });

        let mut client = connect(&format!("ws://{addr}")).await.unwrap();
        assert!(client.recv_text().await.unwrap().is_none());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_nothing_fails() {
        // Port 1 is essentially never listening on loopback.
        let result = connect("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
