use serde_json::{Number, Value};

use crate::envelope::Envelope;
use crate::error::{Result, WireError};

/// Maximum accepted envelope size: 16 MiB of JSON text.
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Encode an envelope into a wire message.
///
/// Payload values are validated first: a value that JSON cannot represent
/// losslessly (only non-finite numbers, in practice) is rejected with
/// [`WireError::UnsupportedValue`] instead of being silently mangled.
pub fn encode(envelope: &Envelope) -> Result<String> {
    match envelope {
        Envelope::Request { args, .. } => {
            for value in args {
                ensure_transportable(value)?;
            }
        }
        Envelope::Response { result, error, .. } => {
            if let Some(value) = result {
                ensure_transportable(value)?;
            }
            if let Some(body) = error {
                if let Some(detail) = &body.detail {
                    ensure_transportable(detail)?;
                }
            }
        }
    }

    serde_json::to_string(envelope).map_err(|err| WireError::UnsupportedValue(err.to_string()))
}

/// Decode a wire message into an envelope.
///
/// Total: any malformed input (bad JSON, unknown `kind`, a response with
/// both or neither of `result`/`error`, oversized text) yields a
/// [`WireError::Decode`] describing the problem.
pub fn decode(message: &str) -> Result<Envelope> {
    if message.len() > MAX_ENVELOPE_SIZE {
        return Err(WireError::Decode(format!(
            "envelope too large: {} bytes (max {})",
            message.len(),
            MAX_ENVELOPE_SIZE
        )));
    }

    let envelope: Envelope =
        serde_json::from_str(message).map_err(|err| WireError::Decode(err.to_string()))?;

    if let Envelope::Response { result, error, .. } = &envelope {
        match (result, error) {
            (Some(_), Some(_)) => {
                return Err(WireError::Decode(
                    "response carries both result and error".to_string(),
                ));
            }
            (None, None) => {
                return Err(WireError::Decode(
                    "response carries neither result nor error".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(envelope)
}

/// Convert a float into a wire value, rejecting non-finite inputs.
pub fn number(value: f64) -> Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| WireError::UnsupportedValue(format!("non-finite number: {value}")))
}

fn ensure_transportable(value: &Value) -> Result<()> {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(WireError::UnsupportedValue(format!(
                        "non-finite number: {f}"
                    )));
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                ensure_transportable(item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for item in map.values() {
                ensure_transportable(item)?;
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
    }
}
