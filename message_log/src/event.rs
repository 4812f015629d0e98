use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// A single protocol message as written to the message log.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// When the log line was written.
    pub timestamp: DateTime<Utc>,
    pub id: String,
    /// The kind of message, e.g. `ACK`, `DATA` or `HI`.
    pub target: String,
    pub to: String,
    pub from: String,
    /// For an `ACK` this is the id of the message being acknowledged.
    pub text: Option<String>,
    /// When the message was created by its sender. Usually absent for `ACK`s.
    pub created: Option<DateTime<Utc>>,
}

/// One line of the log.
///
/// Older logs store the message under `GameMsg` and newer ones under `message`. Either way it may
/// be an object or a string holding the JSON encoded object.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "GameMsg")]
    pub message: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    pub id: Value,
    pub target: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Decode the embedded message, whichever form it is stored in.
    pub(crate) fn into_event(self) -> Result<MessageEvent, EventError> {
        let raw: RawMessage = match self.message {
            Value::String(encoded) => serde_json::from_str(&encoded)?,
            object => serde_json::from_value(object)?,
        };

        let id = match raw.id {
            Value::String(id) => id,
            Value::Number(id) => id.to_string(),
            other => return Err(EventError::InvalidId(other.to_string())),
        };

        let text = match raw.text {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => Some(other.to_string()),
        };

        Ok(MessageEvent {
            timestamp: self.timestamp,
            id,
            target: raw.target,
            to: raw.to.unwrap_or_default(),
            from: raw.from.unwrap_or_default(),
            text,
            created: raw.created,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid embedded message: {0}")]
    Message(#[from] serde_json::Error),
    #[error("message id must be a string or a number, got {0}")]
    InvalidId(String),
}
