//! Error types surfaced to handlers and to callers building a client.

use kiosk_protocol::DecodeError;

use crate::transport::TransportError;

/// Errors delivered to the `on_error` handler.
///
/// None of these stop the client by themselves; a [`Transport`]
/// error only decides whether a reconnect is scheduled.
///
/// [`Transport`]: StreamError::Transport
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Payload was not valid JSON.
    #[error("parse: {0}")]
    Parse(#[source] serde_json::Error),
    /// JSON, but not an envelope (missing or non-string `type`).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// A valid snapshot envelope whose `data` does not convert into the
    /// handler's snapshot type.
    #[error("snapshot data: {msg_type}: {source}")]
    SnapshotData {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },
    /// The push connection failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

impl From<DecodeError> for StreamError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Parse(e) => StreamError::Parse(e),
            DecodeError::InvalidMessage(m) => StreamError::InvalidMessage(m),
        }
    }
}

/// Errors from building a client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("transport: {0}")]
    Transport(String),
}
