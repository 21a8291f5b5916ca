use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wsrpc_wire::CallId;

use crate::error::RpcError;

pub(crate) type CallOutcome = std::result::Result<Value, RpcError>;

struct Pending {
    tx: oneshot::Sender<CallOutcome>,
    created_at: Instant,
}

/// Tracks in-flight outgoing calls by correlation id.
///
/// One entry per outstanding request id; removed on response, timeout,
/// cancellation, or connection loss. Ids are unique among currently
/// pending calls within a connection epoch.
#[derive(Default)]
pub(crate) struct CallRegistry {
    inner: Mutex<HashMap<CallId, Pending>>,
}

impl CallRegistry {
    /// Allocate a pending call and return the receiver its outcome will
    /// arrive on.
    pub(crate) fn register(&self, id: CallId) -> oneshot::Receiver<CallOutcome> {
        let (tx, rx) = oneshot::channel();
        let entry = Pending {
            tx,
            created_at: Instant::now(),
        };
        let mut pending = self.inner.lock().expect("call registry poisoned");
        if pending.insert(id.clone(), entry).is_some() {
            // Id reuse while the prior call is still pending violates the
            // uniqueness invariant; the old call's receiver sees a drop.
            warn!(%id, "replaced pending call with duplicate id");
        }
        rx
    }

    /// Complete and remove the pending call matching `id`.
    ///
    /// A response for an unknown id (already timed out, cancelled, or never
    /// ours) is a logged no-op.
    pub(crate) fn complete(&self, id: &CallId, outcome: CallOutcome) -> bool {
        let entry = {
            let mut pending = self.inner.lock().expect("call registry poisoned");
            pending.remove(id)
        };
        match entry {
            Some(call) => {
                debug!(%id, elapsed = ?call.created_at.elapsed(), "call completed");
                // The caller may have dropped its future; nothing to do then.
                let _ = call.tx.send(outcome);
                true
            }
            None => {
                warn!(%id, "response for unknown call id, ignoring");
                false
            }
        }
    }

    /// Remove a pending call without completing it (timeout path — the
    /// caller's future already produced its own error).
    pub(crate) fn discard(&self, id: &CallId) -> bool {
        let mut pending = self.inner.lock().expect("call registry poisoned");
        pending.remove(id).is_some()
    }

    /// Cancel a pending call: remove it and resolve its future with
    /// `Cancelled`. The remote peer is not notified.
    pub(crate) fn cancel(&self, id: &CallId) -> bool {
        let entry = {
            let mut pending = self.inner.lock().expect("call registry poisoned");
            pending.remove(id)
        };
        match entry {
            Some(call) => {
                let _ = call.tx.send(Err(RpcError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Reject every pending call with `ConnectionLost` and clear the
    /// registry. Called on disconnect so no call future hangs forever.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<Pending> = {
            let mut pending = self.inner.lock().expect("call registry poisoned");
            pending.drain().map(|(_, call)| call).collect()
        };
        let count = drained.len();
        for call in drained {
            let _ = call
                .tx
                .send(Err(RpcError::ConnectionLost(reason.to_string())));
        }
        if count > 0 {
            debug!(count, reason, "failed all pending calls");
        }
        count
    }

    /// Number of currently pending calls.
    pub(crate) fn pending(&self) -> usize {
        self.inner.lock().expect("call registry poisoned").len()
    }
}
