//! Caller callbacks and the routing of decoded envelopes onto them.
//!
//! - `on_snapshot` (required): envelopes whose type ends in `.snapshot`;
//!   receives only the payload, converted to the handler's `D`.
//! - `on_message` (optional): every other valid envelope, in full and
//!   untyped.  Command payloads are the caller's to interpret.
//! - `on_error` (optional): parse failures, invalid envelopes, snapshot
//!   payloads that do not fit `D` and transport errors.  Without it errors
//!   are logged at debug level and dropped.
//!
//! # Example
//!
//! ```rust
//! use kiosk_stream::StreamHandlers;
//!
//! let handlers = StreamHandlers::new(|state: serde_json::Value| {
//!     println!("full state: {state}");
//! })
//! .on_message(|msg| println!("{} #{:?}", msg.msg_type, msg.seq))
//! .on_error(|err| eprintln!("stream error: {err}"));
//! ```

use std::fmt;
use std::sync::Arc;

use kiosk_protocol::{MessageKind, ServerMessage};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::StreamError;

pub type OnSnapshotCallback<D> = Arc<dyn Fn(D) + Send + Sync>;
pub type OnMessageCallback = Arc<dyn Fn(ServerMessage) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(StreamError) + Send + Sync>;

/// Callbacks invoked from the client task, one event at a time, in the
/// order the transport delivered them.
pub struct StreamHandlers<D = Value> {
    on_snapshot: OnSnapshotCallback<D>,
    on_message: Option<OnMessageCallback>,
    on_error: Option<OnErrorCallback>,
}

impl<D> Clone for StreamHandlers<D> {
    fn clone(&self) -> Self {
        Self {
            on_snapshot: self.on_snapshot.clone(),
            on_message: self.on_message.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<D> fmt::Debug for StreamHandlers<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<D> StreamHandlers<D> {
    pub fn new(on_snapshot: impl Fn(D) + Send + Sync + 'static) -> Self {
        Self {
            on_snapshot: Arc::new(on_snapshot),
            on_message: None,
            on_error: None,
        }
    }

    pub fn on_message(mut self, f: impl Fn(ServerMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(StreamError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn report(&self, err: StreamError) {
        match &self.on_error {
            Some(on_error) => on_error(err),
            None => tracing::debug!(error = %err, "no error handler, dropping"),
        }
    }
}

impl<D: DeserializeOwned> StreamHandlers<D> {
    /// Route a decoded envelope to exactly one callback.
    pub fn dispatch(&self, envelope: ServerMessage) {
        tracing::debug!(
            msg_type = %envelope.msg_type,
            seq = ?envelope.seq,
            "dispatching envelope"
        );
        match envelope.kind() {
            MessageKind::Snapshot => match serde_json::from_value::<D>(envelope.data) {
                Ok(data) => (self.on_snapshot)(data),
                Err(source) => self.report(StreamError::SnapshotData {
                    msg_type: envelope.msg_type,
                    source,
                }),
            },
            MessageKind::Incremental => {
                if let Some(on_message) = &self.on_message {
                    on_message(envelope);
                }
            }
        }
    }

    /// Decode one raw payload and dispatch it, or report why it could not
    /// be decoded.  Never fails past this point.
    pub(crate) fn handle_payload(&self, raw: &str) {
        match kiosk_protocol::decode(raw) {
            Ok(envelope) => self.dispatch(envelope),
            Err(e) => {
                tracing::debug!(error = %e, "dropping undecodable payload");
                self.report(e.into());
            }
        }
    }
}
