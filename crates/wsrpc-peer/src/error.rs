use serde_json::{json, Value};
use wsrpc_wire::ErrorBody;

/// Errors that can occur in RPC peer operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The remote peer has no handler registered under this name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A handler failed; carries the handler's own message and detail.
    #[error("handler error: {message}")]
    Handler {
        message: String,
        detail: Option<Value>,
    },

    /// The call received no response within its deadline.
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The connection dropped while the call was pending.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The call was cancelled locally. The remote peer is not notified.
    #[error("call cancelled")]
    Cancelled,

    /// The peer is not ready for calls and queuing is off or full.
    #[error("not connected")]
    NotConnected,

    /// Envelope encoding/decoding error.
    #[error("wire error: {0}")]
    Wire(#[from] wsrpc_wire::WireError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wsrpc_transport::TransportError),
}

const KIND_METHOD_NOT_FOUND: &str = "method_not_found";
const KIND_HANDLER_ERROR: &str = "handler_error";

impl RpcError {
    /// Shorthand for a handler failure with a message only.
    pub fn handler(message: impl Into<String>) -> Self {
        RpcError::Handler {
            message: message.into(),
            detail: None,
        }
    }

    /// Convert into the wire-level error body of a failure response.
    ///
    /// `detail.kind` distinguishes a missing method from a failed handler so
    /// the calling side can decide whether a retry makes sense.
    pub(crate) fn into_error_body(self) -> ErrorBody {
        match self {
            RpcError::MethodNotFound(method) => ErrorBody::with_detail(
                format!("method not found: {method}"),
                json!({ "kind": KIND_METHOD_NOT_FOUND, "method": method }),
            ),
            RpcError::Handler { message, detail } => {
                let mut body = json!({ "kind": KIND_HANDLER_ERROR });
                if let Some(detail) = detail {
                    body["data"] = detail;
                }
                ErrorBody::with_detail(message, body)
            }
            // Local-only kinds never cross the wire as responses; if one
            // ends up here, report it as a handler failure.
            other => ErrorBody::with_detail(
                other.to_string(),
                json!({ "kind": KIND_HANDLER_ERROR }),
            ),
        }
    }

    /// Reconstruct from the error body of a received failure response.
    pub(crate) fn from_error_body(body: ErrorBody) -> Self {
        let kind = body
            .detail
            .as_ref()
            .and_then(|d| d.get("kind"))
            .and_then(Value::as_str);
        match kind {
            Some(KIND_METHOD_NOT_FOUND) => {
                let method = body
                    .detail
                    .as_ref()
                    .and_then(|d| d.get("method"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                RpcError::MethodNotFound(method)
            }
            _ => RpcError::Handler {
                message: body.message,
                detail: body.detail.and_then(|mut d| {
                    d.as_object_mut().and_then(|map| map.remove("data"))
                }),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_survives_the_wire() {
        let body = RpcError::MethodNotFound("Calculator.divide".to_string()).into_error_body();
        let back = RpcError::from_error_body(body);
        assert!(matches!(back, RpcError::MethodNotFound(m) if m == "Calculator.divide"));
    }

    #[test]
    fn handler_detail_survives_the_wire() {
        let err = RpcError::Handler {
            message: "division by zero".to_string(),
            detail: Some(json!({ "divisor": 0 })),
        };
        let back = RpcError::from_error_body(err.into_error_body());
        match back {
            RpcError::Handler { message, detail } => {
                assert_eq!(message, "division by zero");
                assert_eq!(detail, Some(json!({ "divisor": 0 })));
            }
            other => panic!("expected handler error, got {other:?}"),
        }
    }

    #[test]
    fn foreign_error_body_maps_to_handler_error() {
        let body = ErrorBody::new("something else entirely");
        let back = RpcError::from_error_body(body);
        assert!(matches!(back, RpcError::Handler { .. }));
    }
}
