use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wsrpc_transport::WsConnection;
use wsrpc_wire::{CallId, Envelope};

use crate::calls::CallRegistry;
use crate::config::RpcConfig;
use crate::dispatch::run_epoch;
use crate::error::{Result, RpcError};
use crate::proxy::{PendingRpc, RemoteComponent};
use crate::registry::{MethodRegistry, SYSTEM_LIST_COMPONENTS};
use crate::state::{ConnectionState, StateEvents};

/// State shared between the public peer handle, the connection manager
/// task, and per-epoch dispatcher tasks.
pub(crate) struct Shared {
    pub(crate) registry: MethodRegistry,
    pub(crate) calls: CallRegistry,
    pub(crate) config: RpcConfig,
    pub(crate) shutdown: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    /// Sender into the current epoch's outbound loop; `None` between epochs.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Encoded requests issued before `Ready`, drained on transition.
    queue: Mutex<Vec<String>>,
    /// Remote surface discovered during the introspection handshake.
    remote: Mutex<BTreeMap<String, Vec<String>>>,
    next_id: AtomicU64,
}

impl Shared {
    fn new(registry: MethodRegistry, config: RpcConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            registry,
            calls: CallRegistry::default(),
            config,
            shutdown: CancellationToken::new(),
            state_tx,
            outbound: Mutex::new(None),
            queue: Mutex::new(Vec::new()),
            remote: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    pub(crate) fn fresh_id(&self) -> CallId {
        CallId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn install_sender(&self, tx: mpsc::UnboundedSender<String>) {
        *self.outbound.lock().expect("outbound lock poisoned") = Some(tx);
    }

    /// Send bypassing the `Ready` gate. Used for responses and the
    /// handshake exchange, which must flow while still `Handshaking`.
    pub(crate) fn send_direct(&self, text: String) -> Result<()> {
        let outbound = self.outbound.lock().expect("outbound lock poisoned");
        match outbound.as_ref() {
            Some(tx) if tx.send(text).is_ok() => Ok(()),
            _ => Err(RpcError::NotConnected),
        }
    }

    /// Enqueue an outgoing request, honoring the `Ready` gate.
    ///
    /// The shutdown token is cancelled both by `close()` and when the
    /// connection manager exits for good; either way no further epoch
    /// will drain the queue, so new calls are rejected outright.
    pub(crate) fn submit(&self, text: String) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(RpcError::NotConnected);
        }
        match self.state() {
            ConnectionState::Ready => self.send_direct(text),
            ConnectionState::Closing => Err(RpcError::NotConnected),
            _ if self.config.queue_calls_before_ready => {
                let mut queue = self.queue.lock().expect("queue lock poisoned");
                if queue.len() >= self.config.max_queued_calls {
                    return Err(RpcError::NotConnected);
                }
                queue.push(text);
                Ok(())
            }
            _ => Err(RpcError::NotConnected),
        }
    }

    fn drain_queue(&self) {
        let drained: Vec<String> = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            std::mem::take(&mut *queue)
        };
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "draining pre-ready call queue");
        for text in drained {
            if let Err(err) = self.send_direct(text) {
                warn!(%err, "dropping queued call during drain");
            }
        }
    }

    /// Tear down the current epoch: stop outbound traffic, drop queued
    /// requests, and fail every pending call so no future hangs.
    fn fail_epoch(&self, reason: &str) {
        *self.outbound.lock().expect("outbound lock poisoned") = None;
        self.queue.lock().expect("queue lock poisoned").clear();
        self.calls.fail_all(reason);
    }

    fn set_remote(&self, components: BTreeMap<String, Vec<String>>) {
        *self.remote.lock().expect("remote lock poisoned") = components;
    }
}

/// One side of a bidirectional RPC connection.
///
/// Both ends expose the same type: register local components on
/// [`registry`](RpcPeer::registry), invoke remote methods with
/// [`call`](RpcPeer::call). Client peers come from
/// [`connect`](RpcPeer::connect); server peers from
/// [`crate::RpcListener::accept`].
pub struct RpcPeer {
    shared: Arc<Shared>,
    manager: Mutex<Option<JoinHandle<()>>>,
}

impl RpcPeer {
    /// Open a connection to `url` (e.g. `ws://127.0.0.1:8080`).
    ///
    /// Returns immediately; the connection is established in the
    /// background. Await [`ready`](RpcPeer::ready) to block until calls
    /// can flow, or just issue calls — with the default configuration they
    /// queue until the peer is `Ready`.
    pub fn connect(url: impl Into<String>, config: RpcConfig) -> Self {
        let shared = Shared::new(MethodRegistry::new(), config);
        let manager = tokio::spawn(run_client(Arc::clone(&shared), url.into()));
        Self {
            shared,
            manager: Mutex::new(Some(manager)),
        }
    }

    /// Wrap a server-accepted connection. Accepted peers go `Ready`
    /// immediately and never reconnect.
    pub(crate) fn accepted(conn: WsConnection, registry: MethodRegistry, config: RpcConfig) -> Self {
        let shared = Shared::new(registry, config);
        let manager = tokio::spawn(run_accepted(Arc::clone(&shared), conn));
        Self {
            shared,
            manager: Mutex::new(Some(manager)),
        }
    }

    /// The local method registry. Components may be added before or after
    /// the connection is up.
    pub fn registry(&self) -> &MethodRegistry {
        &self.shared.registry
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribe to connection state transitions.
    pub fn events(&self) -> StateEvents {
        StateEvents::new(
            self.shared.state_tx.subscribe(),
            self.shared.shutdown.clone(),
        )
    }

    /// Wait until the peer is ready for calls.
    pub async fn ready(&self) -> Result<()> {
        self.events().ready().await
    }

    /// Invoke a remote method by dotted name, e.g.
    /// `peer.call("Calculator.add", vec![json!(5), json!(3)])`.
    ///
    /// Returns an awaitable pending call carrying the connection's default
    /// timeout. Any name the remote has registered can be called; nothing
    /// is declared statically.
    pub fn call(&self, method: impl Into<String>, args: Vec<Value>) -> PendingRpc {
        self.call_inner(method.into(), args, self.shared.config.call_timeout)
    }

    /// Like [`call`](RpcPeer::call) with an explicit per-call deadline.
    pub fn call_with_timeout(
        &self,
        method: impl Into<String>,
        args: Vec<Value>,
        timeout: Duration,
    ) -> PendingRpc {
        self.call_inner(method.into(), args, Some(timeout))
    }

    /// Convenience wrapper scoped to one remote component:
    /// `peer.proxy("Calculator").invoke("add", args)`.
    pub fn proxy<'a>(&'a self, component: &str) -> RemoteComponent<'a> {
        RemoteComponent::new(self, component)
    }

    /// The remote peer's components as discovered during the handshake.
    /// Empty for accepted peers and before first `Ready`.
    pub fn remote_components(&self) -> BTreeMap<String, Vec<String>> {
        self.shared
            .remote
            .lock()
            .expect("remote lock poisoned")
            .clone()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.calls.pending()
    }

    /// Close the connection and stop the background tasks. Pending calls
    /// are rejected with `ConnectionLost`.
    pub async fn close(&self) {
        self.shared.set_state(ConnectionState::Closing);
        self.shared.shutdown.cancel();
        let manager = self
            .manager
            .lock()
            .expect("manager lock poisoned")
            .take();
        if let Some(handle) = manager {
            if let Err(err) = handle.await {
                warn!(%err, "connection manager task failed");
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn call_inner(&self, method: String, args: Vec<Value>, timeout: Option<Duration>) -> PendingRpc {
        let id = self.shared.fresh_id();
        let rx = self.shared.calls.register(id.clone());
        let envelope = Envelope::request(id.clone(), method, args);

        let submitted = wsrpc_wire::encode(&envelope)
            .map_err(RpcError::from)
            .and_then(|text| self.shared.submit(text));
        if let Err(err) = submitted {
            // Resolve the freshly registered call in place; awaiting it
            // yields this error.
            self.shared.calls.complete(&id, Err(err));
        }

        PendingRpc::new(id, rx, timeout, Arc::clone(&self.shared))
    }
}

impl Drop for RpcPeer {
    fn drop(&mut self) {
        // Background tasks must not outlive the handle.
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPeer")
            .field("state", &self.shared.state())
            .field("pending_calls", &self.shared.calls.pending())
            .finish()
    }
}

/// Client-side connection manager: connect, handshake, dispatch, and on
/// loss either stop or reconnect with backoff.
async fn run_client(shared: Arc<Shared>, url: String) {
    let mut attempt: u32 = 0;
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);
        // A connect attempt can hang for the OS timeout on an unroutable
        // target; close() must not wait that out.
        let connected = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            result = wsrpc_transport::connect(&url) => result,
        };
        match connected {
            Ok(conn) => {
                shared.set_state(ConnectionState::Handshaking);
                let (tx, rx) = mpsc::unbounded_channel();
                shared.install_sender(tx);
                let epoch = tokio::spawn(run_epoch(Arc::clone(&shared), conn, rx));

                match introspect_remote(&shared).await {
                    Ok(()) => {
                        attempt = 0;
                        shared.set_state(ConnectionState::Ready);
                        shared.drain_queue();
                        match epoch.await {
                            Ok(Ok(())) => debug!("epoch ended on shutdown"),
                            Ok(Err(err)) => warn!(%err, "connection lost"),
                            Err(err) => warn!(%err, "dispatcher task failed"),
                        }
                    }
                    Err(err) => {
                        warn!(%err, "handshake failed, dropping connection");
                        epoch.abort();
                        let _ = epoch.await;
                    }
                }
                shared.set_state(ConnectionState::Closing);
                // The watch channel keeps only the latest value; yield so
                // subscribers can observe Closing before it is overwritten.
                tokio::task::yield_now().await;
            }
            Err(err) => {
                debug!(url = %url, %err, "connect attempt failed");
            }
        }

        shared.fail_epoch("connection lost");
        if shared.shutdown.is_cancelled() || !shared.config.auto_reconnect {
            break;
        }
        shared.set_state(ConnectionState::Disconnected);

        let delay = shared.config.backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(?delay, attempt, "reconnect scheduled");
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    // No further epoch will come; wake every waiter still parked on the
    // state channel and reject everything pending.
    shared.shutdown.cancel();
    shared.fail_epoch("peer closed");
    shared.set_state(ConnectionState::Disconnected);
}

/// Server-side manager for an accepted connection: single epoch, no
/// introspection handshake, no reconnect.
async fn run_accepted(shared: Arc<Shared>, conn: WsConnection) {
    shared.set_state(ConnectionState::Handshaking);
    let (tx, rx) = mpsc::unbounded_channel();
    shared.install_sender(tx);
    let epoch = tokio::spawn(run_epoch(Arc::clone(&shared), conn, rx));
    shared.set_state(ConnectionState::Ready);
    shared.drain_queue();

    match epoch.await {
        Ok(Ok(())) => debug!("epoch ended on shutdown"),
        Ok(Err(err)) => debug!(%err, "accepted connection ended"),
        Err(err) => warn!(%err, "dispatcher task failed"),
    }
    shared.set_state(ConnectionState::Closing);
    tokio::task::yield_now().await;
    shared.shutdown.cancel();
    shared.fail_epoch("connection lost");
    shared.set_state(ConnectionState::Disconnected);
}

/// Handshake step: ask the remote for its component listing and cache it.
/// Runs while still `Handshaking`, through the normal call machinery.
async fn introspect_remote(shared: &Arc<Shared>) -> Result<()> {
    let id = shared.fresh_id();
    let rx = shared.calls.register(id.clone());
    let envelope = Envelope::request(id.clone(), SYSTEM_LIST_COMPONENTS, Vec::new());
    shared.send_direct(wsrpc_wire::encode(&envelope)?)?;

    let outcome = tokio::time::timeout(shared.config.handshake_timeout, rx).await;
    match outcome {
        Ok(Ok(Ok(value))) => {
            let components: BTreeMap<String, Vec<String>> = serde_json::from_value(value)
                .map_err(|err| {
                    RpcError::ConnectionLost(format!("bad introspection response: {err}"))
                })?;
            debug!(components = components.len(), "remote surface discovered");
            shared.set_remote(components);
            Ok(())
        }
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_)) => Err(RpcError::ConnectionLost(
            "connection dropped during handshake".to_string(),
        )),
        Err(_) => {
            shared.calls.discard(&id);
            Err(RpcError::Timeout(shared.config.handshake_timeout))
        }
    }
}
