use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wsrpc_transport::WsConnection;
use wsrpc_wire::{CallId, Envelope};

use crate::error::{Result, RpcError};
use crate::peer::Shared;

/// Run one connection epoch: the single consumer of inbound messages.
///
/// Inbound order is preserved as delivered by the transport, but each
/// request's handler runs as its own task, so a slow handler never stalls
/// the loop and responses may go out in a different order than requests
/// arrived.
///
/// Returns `Ok(())` on shutdown, `Err(ConnectionLost)` when the transport
/// drops.
pub(crate) async fn run_epoch(
    shared: Arc<Shared>,
    mut conn: WsConnection,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                debug!("epoch shutting down");
                let _ = conn.close().await;
                return Ok(());
            }
            outgoing = outbound.recv() => {
                match outgoing {
                    Some(text) => {
                        if let Err(err) = conn.send_text(text).await {
                            return Err(RpcError::ConnectionLost(err.to_string()));
                        }
                    }
                    // All senders gone; the epoch is being torn down.
                    None => return Ok(()),
                }
            }
            incoming = conn.recv_text() => {
                match incoming {
                    Ok(Some(text)) => route_message(&shared, &text),
                    Ok(None) => {
                        return Err(RpcError::ConnectionLost("peer closed connection".to_string()));
                    }
                    Err(err) => return Err(RpcError::ConnectionLost(err.to_string())),
                }
            }
        }
    }
}

/// Classify one inbound message and hand it to the method registry
/// (request) or the call registry (response). Malformed messages are a
/// protocol anomaly: logged and dropped, never fatal to the connection.
fn route_message(shared: &Arc<Shared>, text: &str) {
    match wsrpc_wire::decode(text) {
        Ok(Envelope::Request { id, method, args }) => {
            debug!(%id, %method, "inbound call request");
            let shared = Arc::clone(shared);
            tokio::spawn(handle_request(shared, id, method, args));
        }
        Ok(Envelope::Response { id, result, error }) => {
            let outcome = match (result, error) {
                (Some(value), None) => Ok(value),
                (None, Some(body)) => Err(RpcError::from_error_body(body)),
                // decode() guarantees exactly one side is set.
                _ => Err(RpcError::ConnectionLost("invalid response shape".to_string())),
            };
            shared.calls.complete(&id, outcome);
        }
        Err(err) => {
            warn!(%err, "dropping malformed message");
        }
    }
}

/// Execute one inbound request and send back a response envelope carrying
/// the same id. Handler panics are contained at the task boundary and
/// reported to the caller as a handler error.
async fn handle_request(shared: Arc<Shared>, id: CallId, method: String, args: Vec<Value>) {
    let registry = shared.registry.clone();
    let dispatched_method = method.clone();
    let outcome = match tokio::spawn(async move { registry.dispatch(&dispatched_method, args).await })
        .await
    {
        Ok(outcome) => outcome,
        Err(join_err) => {
            warn!(%method, %join_err, "handler panicked");
            Err(RpcError::handler(format!("handler panicked: {method}")))
        }
    };

    let envelope = match outcome {
        Ok(value) => Envelope::success(id.clone(), value),
        Err(err) => Envelope::failure(id.clone(), err.into_error_body()),
    };

    let text = match wsrpc_wire::encode(&envelope) {
        Ok(text) => text,
        Err(err) => {
            // The handler produced a value the wire cannot carry; tell the
            // caller instead of leaving its future pending.
            warn!(%id, %err, "response not encodable");
            let fallback = Envelope::failure(
                id.clone(),
                RpcError::handler(format!("result not encodable: {err}")).into_error_body(),
            );
            match wsrpc_wire::encode(&fallback) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%id, %err, "failed to encode fallback response");
                    return;
                }
            }
        }
    };

    if let Err(err) = shared.send_direct(text) {
        debug!(%id, %err, "response dropped, connection already gone");
    }
}
