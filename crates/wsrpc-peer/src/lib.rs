//! Bidirectional RPC engine over a WebSocket transport.
//!
//! Two peers connect once; thereafter either side may invoke named
//! methods (`Component.method`) on the other and receive results or
//! errors asynchronously. Either side exposes local components by
//! registering them, and discovers the remote surface through the
//! built-in `system.listComponents` introspection method.
//!
//! ```no_run
//! use serde_json::json;
//! use wsrpc_peer::{arg_f64, Component, RpcConfig, RpcPeer};
//!
//! # async fn demo() -> wsrpc_peer::Result<()> {
//! let peer = RpcPeer::connect("ws://127.0.0.1:8080", RpcConfig::default());
//! peer.registry().add_component(Component::new("Clock").sync_method(
//!     "now",
//!     |_args| Ok(json!(42)),
//! ));
//! peer.ready().await?;
//! let sum = peer.call("Calculator.add", vec![json!(5), json!(3)]).await?;
//! assert_eq!(arg_f64(&[sum], 0)?, 8.0);
//! # Ok(())
//! # }
//! ```

mod calls;
mod dispatch;
mod peer;

pub mod component;
pub mod config;
pub mod error;
pub mod listener;
pub mod proxy;
pub mod registry;
pub mod state;

pub use component::{arg_f64, arg_str, Component, HandlerFuture};
pub use config::{BackoffConfig, RpcConfig};
pub use error::{Result, RpcError};
pub use listener::RpcListener;
pub use peer::RpcPeer;
pub use proxy::{CallHandle, PendingRpc, RemoteComponent};
pub use registry::{MethodRegistry, SYSTEM_LIST_COMPONENTS};
pub use state::{ConnectionState, StateEvents};

pub use wsrpc_wire::{CallId, Envelope};
