use std::net::SocketAddr;

use wsrpc_transport::WsListener;

use crate::config::RpcConfig;
use crate::error::Result;
use crate::peer::RpcPeer;
use crate::registry::MethodRegistry;

/// Server-side accept loop producing engine peers.
///
/// Components registered on the listener's registry are exposed on every
/// accepted connection; each accepted [`RpcPeer`] is fully bidirectional
/// and can itself call methods the connecting client exposes.
pub struct RpcListener {
    inner: WsListener,
    registry: MethodRegistry,
    config: RpcConfig,
}

impl RpcListener {
    /// Bind to a local address with default configuration.
    pub async fn bind(addr: &str) -> Result<Self> {
        Ok(Self {
            inner: WsListener::bind(addr).await?,
            registry: MethodRegistry::new(),
            config: RpcConfig::default(),
        })
    }

    /// Replace the configuration applied to accepted peers.
    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry shared by all accepted peers.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept the next connection and wrap it as an RPC peer.
    pub async fn accept(&self) -> Result<RpcPeer> {
        let conn = self.inner.accept().await?;
        Ok(RpcPeer::accepted(
            conn,
            self.registry.clone(),
            self.config.clone(),
        ))
    }
}
