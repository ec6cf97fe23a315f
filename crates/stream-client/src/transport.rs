//! The push connection the client drives.
//!
//! A transport turns a URL into a stream of [`TransportEvent`]s.  Dropping
//! the stream closes the connection; the client never reuses one, it opens
//! a fresh stream for every (re)connect.

use futures_util::stream::BoxStream;

/// Something the connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established; events will follow.
    Open,
    /// One complete event payload (text).
    Message(String),
    /// The connection failed or ended.  No further events are expected.
    Error(TransportError),
}

/// A failure reported by the transport.  Carries a description only; the
/// underlying connection rarely says more.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Opens one-way, server-push connections.
pub trait Transport: Send + Sync + 'static {
    /// Start connecting to `url`.  Must not block: the returned stream does
    /// the work as it is polled.
    fn open(&self, url: &str) -> BoxStream<'static, TransportEvent>;
}
