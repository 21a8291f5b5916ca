/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The message is not a well-formed envelope. Non-fatal: the dispatcher
    /// logs it and drops the message.
    #[error("malformed envelope: {0}")]
    Decode(String),

    /// A payload value cannot be represented on the wire (e.g. a non-finite
    /// number). Rejected at encode time.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
