use std::fmt;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, RpcError};

/// Lifecycle of one logical connection.
///
/// `Handshaking` covers the window between transport open and the peer
/// being usable for calls (the introspection exchange happens here);
/// calls issued before `Ready` are queued or rejected per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Subscription to a peer's state transitions.
///
/// Every transition is observable; the common use is awaiting first
/// readiness before issuing calls.
#[derive(Clone)]
pub struct StateEvents {
    rx: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl StateEvents {
    pub(crate) fn new(rx: watch::Receiver<ConnectionState>, shutdown: CancellationToken) -> Self {
        Self { rx, shutdown }
    }

    /// The current state.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Wait for the next transition and return the new state.
    ///
    /// Resolves with an error once the peer has shut down for good, so a
    /// subscriber never waits on a channel nothing will write to again.
    pub async fn changed(&mut self) -> Result<ConnectionState> {
        tokio::select! {
            biased;
            result = self.rx.changed() => {
                result.map_err(|_| RpcError::ConnectionLost("peer dropped".to_string()))?;
                Ok(*self.rx.borrow_and_update())
            }
            _ = self.shutdown.cancelled() => Err(RpcError::NotConnected),
        }
    }

    /// Wait until the peer reaches the given state.
    ///
    /// Fails with `NotConnected` once the peer has shut down for good:
    /// a one-shot connect that terminally failed, or a concurrent
    /// `close()`. The target state still wins if it is already current.
    pub async fn wait_for(&mut self, target: ConnectionState) -> Result<()> {
        tokio::select! {
            biased;
            result = self.rx.wait_for(|state| *state == target) => {
                result
                    .map(|_| ())
                    .map_err(|_| RpcError::ConnectionLost("peer dropped".to_string()))
            }
            _ = self.shutdown.cancelled() => Err(RpcError::NotConnected),
        }
    }

    /// Wait until the peer is ready for calls.
    pub async fn ready(&mut self) -> Result<()> {
        self.wait_for(ConnectionState::Ready).await
    }
}
