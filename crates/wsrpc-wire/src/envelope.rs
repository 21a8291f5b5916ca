use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Correlation token linking a request to its response.
///
/// Integer ids are what the engine generates; string ids are accepted so a
/// foreign peer that prefers them still correlates correctly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallId {
    Number(u64),
    Text(String),
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallId::Number(n) => write!(f, "{n}"),
            CallId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for CallId {
    fn from(n: u64) -> Self {
        CallId::Number(n)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        CallId::Text(s.to_string())
    }
}

/// Structured error carried in a failure response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: Value) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail),
        }
    }
}

/// One wire-level message unit.
///
/// A response carries exactly one of `result`/`error`; [`crate::decode`]
/// enforces that before an envelope reaches the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    Request {
        id: CallId,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Response {
        id: CallId,
        // `null` is a legitimate result value; only an absent field means
        // "no result".
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present_value"
        )]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Build a call request.
    pub fn request(id: impl Into<CallId>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Envelope::Request {
            id: id.into(),
            method: method.into(),
            args,
        }
    }

    /// Build a success response.
    pub fn success(id: impl Into<CallId>, result: Value) -> Self {
        Envelope::Response {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Build a failure response.
    pub fn failure(id: impl Into<CallId>, error: ErrorBody) -> Self {
        Envelope::Response {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// The correlation id of this envelope.
    pub fn id(&self) -> &CallId {
        match self {
            Envelope::Request { id, .. } | Envelope::Response { id, .. } => id,
        }
    }
}
