//! Server-Sent Events transport over `reqwest`.
//!
//! One GET with `Accept: text/event-stream`; every complete event block's
//! `data:` lines become one [`TransportEvent::Message`].  Any of these end
//! the stream with a [`TransportEvent::Error`]:
//!
//! - no response headers within `response_timeout`
//! - a non-2xx status or a read error
//! - an idle window with no bytes
//! - an unterminated event growing past `max_event_bytes`
//! - the server ending the body

use std::time::Duration;

use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use crate::transport::{Transport, TransportError, TransportEvent};
use crate::types::ClientError;

/// Knobs for [`SseTransport`].
#[derive(Debug, Clone)]
pub struct SseOptions {
    /// Limit on TCP + TLS setup.
    pub connect_timeout: Duration,
    /// Limit on waiting for the response status and headers once the
    /// request is sent.
    pub response_timeout: Duration,
    /// Largest unterminated event kept while waiting for its blank line.
    pub max_event_bytes: usize,
    /// Report the connection as failed if no bytes (events or keep-alive
    /// comments) arrive for this long.  `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for SseOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(30),
            max_event_bytes: 1024 * 1024,
            idle_timeout: None,
        }
    }
}

/// The default transport.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    response_timeout: Duration,
    max_event_bytes: usize,
    idle_timeout: Option<Duration>,
}

impl SseTransport {
    pub fn new(options: SseOptions) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("build http client: {e}")))?;

        Ok(Self {
            client,
            response_timeout: options.response_timeout,
            max_event_bytes: options.max_event_bytes,
            idle_timeout: options.idle_timeout,
        })
    }
}

impl Transport for SseTransport {
    fn open(&self, url: &str) -> BoxStream<'static, TransportEvent> {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        let response_timeout = self.response_timeout;
        let max_event_bytes = self.max_event_bytes;
        let idle_timeout = self.idle_timeout;

        let stream = async_stream::stream! {
            let mut response = match tokio::time::timeout(response_timeout, request.send()).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    yield TransportEvent::Error(TransportError::new(format!("connect failed: {e}")));
                    return;
                }
                Err(_) => {
                    yield TransportEvent::Error(TransportError::new(format!(
                        "no response within {}ms",
                        response_timeout.as_millis()
                    )));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                yield TransportEvent::Error(TransportError::new(format!("unexpected status {status}")));
                return;
            }
            yield TransportEvent::Open;

            let mut pending = Vec::new();
            let mut buffer = String::new();

            loop {
                let chunk = match idle_timeout {
                    Some(window) => match tokio::time::timeout(window, response.chunk()).await {
                        Ok(chunk) => chunk,
                        Err(_) => {
                            yield TransportEvent::Error(TransportError::new(format!(
                                "no data for {}ms",
                                window.as_millis()
                            )));
                            return;
                        }
                    },
                    None => response.chunk().await,
                };

                match chunk {
                    Ok(Some(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        push_utf8(&mut pending, &mut buffer);
                        for data in drain_events(&mut buffer) {
                            yield TransportEvent::Message(data);
                        }
                        if let Err(e) = check_unterminated(&buffer, &pending, max_event_bytes) {
                            yield TransportEvent::Error(e);
                            return;
                        }
                    }
                    Ok(None) => {
                        yield TransportEvent::Error(TransportError::new("server closed the stream"));
                        return;
                    }
                    Err(e) => {
                        yield TransportEvent::Error(TransportError::new(format!("read failed: {e}")));
                        return;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

/// Move the decodable prefix of `pending` into `buffer`.  A multi-byte
/// character split across chunks stays in `pending` until completed.
fn push_utf8(pending: &mut Vec<u8>, buffer: &mut String) {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            buffer.push_str(text);
            pending.clear();
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            buffer.push_str(std::str::from_utf8(&pending[..valid]).unwrap_or_default());
            pending.drain(..valid);
        }
        Err(_) => {
            buffer.push_str(&String::from_utf8_lossy(pending));
            pending.clear();
        }
    }
}

/// Fail once the bytes held for an unfinished event exceed `max`.
fn check_unterminated(buffer: &str, pending: &[u8], max: usize) -> Result<(), TransportError> {
    let held = buffer.len() + pending.len();
    if held > max {
        return Err(TransportError::new(format!(
            "event exceeded {max} bytes without terminating"
        )));
    }
    Ok(())
}

/// Extract complete event payloads from an SSE buffer.
///
/// Events are delimited by a blank line.  Multiple `data:` lines in one
/// event are joined with `\n`; `event:`, `id:`, `retry:` and `:` comment
/// lines are skipped.  Events without data are dropped.  Any trailing
/// partial event stays in the buffer for the next call.
pub(crate) fn drain_events(buffer: &mut String) -> Vec<String> {
    if buffer.contains("\r\n") {
        *buffer = buffer.replace("\r\n", "\n");
    }

    let mut events = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // the blank line

        let mut data: Option<String> = None;
        for line in block.lines() {
            let value = match line.strip_prefix("data") {
                Some("") => "",
                Some(rest) => match rest.strip_prefix(':') {
                    Some(v) => v.strip_prefix(' ').unwrap_or(v),
                    None => continue, // e.g. "database: ..."
                },
                None => continue,
            };
            match data.as_mut() {
                Some(d) => {
                    d.push('\n');
                    d.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }

        if let Some(data) = data.filter(|d| !d.is_empty()) {
            events.push(data);
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
