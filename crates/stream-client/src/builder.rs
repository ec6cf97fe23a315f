//! Builder pattern for constructing a [`StreamClient`].

use std::sync::Arc;

use crate::client::StreamClient;
use crate::reconnect::ReconnectPolicy;
use crate::sse::{SseOptions, SseTransport};
use crate::transport::Transport;
use crate::types::ClientError;

/// Fluent builder for [`StreamClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use kiosk_stream::{ReconnectPolicy, StreamClientBuilder};
/// let client = StreamClientBuilder::new()
///     .url("https://kiosk.example.com/v1/events")
///     .reconnect_policy(ReconnectPolicy::new(
///         true,
///         Duration::from_millis(500),
///         Duration::from_secs(10),
///     ))
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct StreamClientBuilder {
    url: Option<String>,
    policy: Option<ReconnectPolicy>,
    transport: Option<Arc<dyn Transport>>,
    sse_options: SseOptions,
}

impl StreamClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Set the push endpoint URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the reconnect policy.  Without this the policy is read from
    /// the `KIOSK_RECONNECT_*` environment variables at build time.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Use a custom transport instead of the built-in SSE one.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Options for the built-in SSE transport.  Ignored when a custom
    /// transport is set.
    pub fn sse_options(mut self, options: SseOptions) -> Self {
        self.sse_options = options;
        self
    }

    /// Build the [`StreamClient`].
    pub fn build(self) -> Result<StreamClient, ClientError> {
        let url = match self.url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Err(ClientError::Config("url is required".into())),
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let parsed = reqwest::Url::parse(&url)
                    .map_err(|e| ClientError::Config(format!("invalid url {url:?}: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ClientError::Config(format!(
                        "unsupported scheme {:?}, expected http or https",
                        parsed.scheme()
                    )));
                }
                Arc::new(SseTransport::new(self.sse_options)?)
            }
        };

        Ok(StreamClient {
            url,
            policy: self.policy.unwrap_or_else(ReconnectPolicy::from_env),
            transport,
        })
    }
}
