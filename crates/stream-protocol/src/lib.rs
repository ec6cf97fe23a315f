//! Push protocol: the `{ type, seq, data }` envelope carried by every event
//! the kiosk server pushes.
//!
//! Only `type` is inspected here.  `seq` and `data` pass through untouched;
//! what they mean is up to the consumer that receives the dispatched
//! envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type suffix reserved for full-state replacements
/// (e.g. `kiosk.state.snapshot`).
pub const SNAPSHOT_SUFFIX: &str = ".snapshot";

/// Envelope wrapped around every pushed event.
///
/// `D` is the payload type.  [`decode`] always produces the untyped
/// default, so the envelope layer never has to know the shape of any
/// command; use [`ServerMessage::data_as`] to read a concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage<D = Value> {
    /// Namespaced message type (e.g. `"kiosk.command.play_motion"`).
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Server-assigned sequence number, exactly as sent.  Usually an
    /// integer, but never checked; `None` only when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<Value>,
    /// Opaque payload.
    pub data: D,
}

/// How an envelope is routed once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Full-state replacement.
    Snapshot,
    /// Everything else: incremental commands and deltas.
    Incremental,
}

/// Classify a message type string.
pub fn classify(msg_type: &str) -> MessageKind {
    if msg_type.ends_with(SNAPSHOT_SUFFIX) {
        MessageKind::Snapshot
    } else {
        MessageKind::Incremental
    }
}

impl<D> ServerMessage<D> {
    pub fn kind(&self) -> MessageKind {
        classify(&self.msg_type)
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind() == MessageKind::Snapshot
    }

    /// `seq` as an integer, when the server sent one.
    pub fn seq_i64(&self) -> Option<i64> {
        self.seq.as_ref().and_then(Value::as_i64)
    }
}

impl ServerMessage<Value> {
    /// Deserialize the untyped payload into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Why a raw payload could not be turned into an envelope.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// Not decodable JSON at all.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
    /// Decoded, but not an envelope.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Decode one raw event payload into an envelope.
///
/// The only shape requirement is a string `type`.  `seq` and `data` are
/// taken as they are; a missing `data` decodes as `null`.
pub fn decode(raw: &str) -> Result<ServerMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;

    let mut fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(DecodeError::InvalidMessage(format!(
                "expected an object with a string `type`, got {}",
                json_kind(&other)
            )));
        }
    };

    let msg_type = match fields.remove("type") {
        Some(Value::String(t)) => t,
        Some(other) => {
            return Err(DecodeError::InvalidMessage(format!(
                "`type` must be a string, got {}",
                json_kind(&other)
            )));
        }
        None => return Err(DecodeError::InvalidMessage("missing `type`".into())),
    };

    let seq = fields.remove("seq");
    let data = fields.remove("data").unwrap_or(Value::Null);

    Ok(ServerMessage {
        msg_type,
        seq,
        data,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
