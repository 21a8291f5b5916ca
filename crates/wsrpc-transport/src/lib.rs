//! WebSocket transport adapter for wsrpc peers.
//!
//! Wraps `tokio-tungstenite` behind a small message-oriented surface:
//! whole text messages in, whole text messages out, delivered in order,
//! with close and error reported as discrete results. Everything above
//! this layer (envelopes, call correlation, reconnection) lives in
//! `wsrpc-wire` and `wsrpc-peer`.

pub mod error;
pub mod listener;
pub mod ws;

pub use error::{Result, TransportError};
pub use listener::WsListener;
pub use ws::{connect, WsConnection};
