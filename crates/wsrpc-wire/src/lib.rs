//! JSON envelope encoding for the wsrpc wire protocol.
//!
//! Every WebSocket text message carries exactly one [`Envelope`]: either a
//! call request (`kind: "request"`) or a call response (`kind: "response"`).
//! Decoding is total: malformed input yields a [`WireError::Decode`], never
//! a panic, so a misbehaving peer can only get its messages dropped.

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::{decode, encode, number, MAX_ENVELOPE_SIZE};
pub use envelope::{CallId, Envelope, ErrorBody};
pub use error::{Result, WireError};
