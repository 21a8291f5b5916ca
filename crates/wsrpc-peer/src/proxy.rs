use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::calls::CallOutcome;
use crate::error::{Result, RpcError};
use crate::peer::{RpcPeer, Shared};
use wsrpc_wire::CallId;

/// An in-flight outgoing call.
///
/// Awaiting it yields the remote result; the call is subject to its
/// timeout (if any) and fails with `ConnectionLost` if the connection
/// drops first. [`handle`](PendingRpc::handle) gives out a cancellation
/// handle usable while the call is pending.
pub struct PendingRpc {
    id: CallId,
    rx: oneshot::Receiver<CallOutcome>,
    timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl PendingRpc {
    pub(crate) fn new(
        id: CallId,
        rx: oneshot::Receiver<CallOutcome>,
        timeout: Option<Duration>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            rx,
            timeout,
            shared,
        }
    }

    /// The call's correlation id.
    pub fn id(&self) -> &CallId {
        &self.id
    }

    /// A handle that can cancel this call from elsewhere. Cancellation is
    /// local-only: the pending entry is removed and the future resolves
    /// with `Cancelled`, but the remote peer keeps executing.
    pub fn handle(&self) -> CallHandle {
        CallHandle {
            id: self.id.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait for the outcome, enforcing the call's deadline.
    pub async fn wait(self) -> Result<Value> {
        let PendingRpc {
            id,
            rx,
            timeout,
            shared,
        } = self;

        match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(RpcError::ConnectionLost("call dropped".to_string())),
                Err(_) => {
                    // Remove the entry so a late response is ignored rather
                    // than resurrecting this call.
                    shared.calls.discard(&id);
                    Err(RpcError::Timeout(deadline))
                }
            },
            None => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RpcError::ConnectionLost("call dropped".to_string())),
            },
        }
    }
}

impl IntoFuture for PendingRpc {
    type Output = Result<Value>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl std::fmt::Debug for PendingRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRpc")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Cancellation handle for one pending call.
#[derive(Clone)]
pub struct CallHandle {
    id: CallId,
    shared: Arc<Shared>,
}

impl CallHandle {
    /// Cancel the call if it is still pending. Returns whether anything
    /// was cancelled.
    pub fn cancel(&self) -> bool {
        self.shared.calls.cancel(&self.id)
    }
}

/// Typed convenience over the dynamic call surface: fixes the component
/// prefix so call sites read `calc.invoke("add", args)`.
pub struct RemoteComponent<'a> {
    peer: &'a RpcPeer,
    name: String,
}

impl<'a> RemoteComponent<'a> {
    pub(crate) fn new(peer: &'a RpcPeer, name: &str) -> Self {
        Self {
            peer,
            name: name.to_string(),
        }
    }

    /// Invoke `method` on this remote component.
    pub fn invoke(&self, method: &str, args: Vec<Value>) -> PendingRpc {
        self.peer.call(format!("{}.{}", self.name, method), args)
    }
}
