//! `kiosk-stream` — resilient server-push client for the kiosk avatar.
//!
//! The kiosk server pushes `{ type, seq, data }` envelopes over a long-lived
//! Server-Sent Events connection.  This crate keeps that connection alive
//! and hands each envelope to the caller; what the commands mean is the
//! caller's business.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Kiosk app                                                │
//! │                                                           │
//! │   let handlers = StreamHandlers::new(|state| apply(state))│
//! │       .on_message(|cmd| run(cmd))                         │
//! │       .on_error(|err| log(err));                          │
//! │                                                           │
//! │   let control = kiosk_stream::connect(url, handlers)?;    │
//! │   ...                                                     │
//! │   control.reconnect();   // network came back, retry now  │
//! │   control.close();                                        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection lifecycle
//!
//! 1. Open the transport; on success the failure count resets to 0
//! 2. Each payload is decoded: `*.snapshot` types go to `on_snapshot`,
//!    everything else to `on_message`, failures to `on_error`
//! 3. On a transport error: report it, then either stop (reconnect
//!    disabled) or drop the transport and reopen after
//!    `min(base * 2^failures, max)`
//! 4. `reconnect()` skips the wait; `close()` cancels everything
//!
//! # Configuration
//!
//! | variable                        | default | bounds          |
//! |---------------------------------|---------|-----------------|
//! | `KIOSK_RECONNECT_ENABLED`       | `true`  |                 |
//! | `KIOSK_RECONNECT_BASE_DELAY_MS` | `3000`  | `[50, 60000]`   |
//! | `KIOSK_RECONNECT_MAX_DELAY_MS`  | `30000` | `[50, 300000]`  |

pub mod builder;
pub mod client;
pub mod config;
pub mod handlers;
pub mod reconnect;
pub mod sse;
pub mod state;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::StreamClientBuilder;
pub use client::{StreamClient, StreamControl};
pub use config::{ConfigSource, ConfigValue, EnvSource, MapSource};
pub use handlers::StreamHandlers;
pub use reconnect::ReconnectPolicy;
pub use sse::{SseOptions, SseTransport};
pub use state::ConnectionState;
pub use transport::{Transport, TransportError, TransportEvent};
pub use types::{ClientError, StreamError};

// Re-export protocol types so callers never need to import kiosk-protocol directly.
pub use kiosk_protocol::{MessageKind, ServerMessage, SNAPSHOT_SUFFIX};

use serde::de::DeserializeOwned;

/// Connect to `url` with the SSE transport and the environment's reconnect
/// policy.  Must be called from within a Tokio runtime.
pub fn connect<D>(
    url: impl Into<String>,
    handlers: StreamHandlers<D>,
) -> Result<StreamControl, ClientError>
where
    D: DeserializeOwned + Send + 'static,
{
    Ok(StreamClient::builder().url(url).build()?.connect(handlers))
}
