//! Core stream client: owns the push connection, the reconnect timer and
//! the back-off counter, and routes transport events into the handlers.
//!
//! Each connected client runs as one task.  Transport events, timer expiry
//! and caller commands are processed strictly one at a time, so the state
//! below needs no locking.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;

use crate::handlers::StreamHandlers;
use crate::reconnect::ReconnectPolicy;
use crate::state::{ConnectionState, ErrorAction, ReconnectState};
use crate::transport::{Transport, TransportError, TransportEvent};
use crate::types::StreamError;

/// A configured client, ready to connect.
///
/// Create via [`StreamClientBuilder`](crate::builder::StreamClientBuilder).
pub struct StreamClient {
    pub(crate) url: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) transport: Arc<dyn Transport>,
}

impl StreamClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::StreamClientBuilder {
        crate::builder::StreamClientBuilder::new()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Open the push connection and start delivering events to `handlers`.
    ///
    /// Spawns the client task, so it must be called from within a Tokio
    /// runtime.  The task lives until the last [`StreamControl`] is dropped.
    pub fn connect<D>(self, handlers: StreamHandlers<D>) -> StreamControl
    where
        D: DeserializeOwned + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting { attempt: 0 });

        let connection = Connection {
            url: self.url,
            policy: self.policy,
            transport: self.transport,
            handlers,
            retry: ReconnectState::default(),
            handle: None,
            timer: None,
            state: state_tx,
            next_id: 0,
        };
        tokio::spawn(connection.run(command_rx));

        StreamControl {
            commands: command_tx,
            state: state_rx,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Close,
    Reconnect,
}

/// Caller's handle on a running client.  Cheap to clone; dropping every
/// clone closes the client.
#[derive(Debug, Clone)]
pub struct StreamControl {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl StreamControl {
    /// Close the client: cancel any pending reconnect and drop the
    /// transport.  Idempotent.  A later [`reconnect`](Self::reconnect)
    /// reopens it.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Drop the current transport and open a new one right away, skipping
    /// back-off.  Resets the failure count and clears a previous close.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Latest published connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

// ── Client task ──────────────────────────────────────────────────────

/// The one live transport.  Dropping it closes the connection.
struct ConnectionHandle {
    id: u64,
    events: BoxStream<'static, TransportEvent>,
}

enum Step {
    Command(Option<Command>),
    Event(TransportEvent),
    TimerFired,
}

struct Connection<D> {
    url: String,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
    handlers: StreamHandlers<D>,
    retry: ReconnectState,
    handle: Option<ConnectionHandle>,
    timer: Option<Pin<Box<Sleep>>>,
    state: watch::Sender<ConnectionState>,
    next_id: u64,
}

impl<D> Connection<D>
where
    D: DeserializeOwned + Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(
            url = %self.url,
            reconnect = self.policy.enabled(),
            base_delay_ms = self.policy.base_delay().as_millis() as u64,
            max_delay_ms = self.policy.max_delay().as_millis() as u64,
            "starting push client"
        );
        self.attach();

        loop {
            // Commands first, so a close wins over anything already queued.
            let step = tokio::select! {
                biased;
                cmd = commands.recv() => Step::Command(cmd),
                () = expire(&mut self.timer) => Step::TimerFired,
                event = next_event(&mut self.handle) => Step::Event(event),
            };

            match step {
                Step::Command(Some(Command::Close)) => self.close(),
                Step::Command(Some(Command::Reconnect)) => self.reconnect(),
                Step::Command(None) => {
                    self.close();
                    break;
                }
                Step::TimerFired => {
                    self.timer = None;
                    if self.retry.on_timer_fired() {
                        self.attach();
                    }
                }
                Step::Event(event) => self.on_event(event),
            }
        }

        tracing::debug!(url = %self.url, "push client task finished");
    }

    /// Open a fresh transport and route its events through this client.
    /// Used for the first connect and every reconnect.
    fn attach(&mut self) {
        self.detach();

        self.next_id += 1;
        let attempt = self.retry.attempt();
        tracing::info!(
            url = %self.url,
            connection_id = self.next_id,
            attempt,
            "opening push connection"
        );

        self.handle = Some(ConnectionHandle {
            id: self.next_id,
            events: self.transport.open(&self.url),
        });
        self.publish(ConnectionState::Connecting { attempt });
    }

    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(connection_id = handle.id, "closing push connection");
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                self.retry.on_open();
                tracing::info!(
                    connection_id = self.handle.as_ref().map(|h| h.id),
                    "push connection open"
                );
                self.publish(ConnectionState::Open);
            }
            TransportEvent::Message(raw) => {
                tracing::trace!(payload = %raw, "received payload");
                self.handlers.handle_payload(&raw);
            }
            TransportEvent::Error(err) => self.on_transport_error(err),
        }
    }

    fn on_transport_error(&mut self, err: TransportError) {
        tracing::warn!(
            connection_id = self.handle.as_ref().map(|h| h.id),
            attempt = self.retry.attempt(),
            error = %err,
            "push connection error"
        );
        self.handlers.report(StreamError::Transport(err));

        match self.retry.on_transport_error(&self.policy) {
            ErrorAction::Ignore | ErrorAction::AlreadyScheduled => {}
            ErrorAction::Stop => {
                tracing::info!("reconnect disabled, staying disconnected");
                self.detach();
                self.publish(ConnectionState::Stopped);
            }
            ErrorAction::Schedule(delay) => {
                self.detach();
                self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                let attempt = self.retry.attempt();
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt,
                    "reconnecting"
                );
                self.publish(ConnectionState::ReconnectScheduled { attempt, delay });
            }
        }
    }

    fn close(&mut self) {
        if !self.retry.close() {
            tracing::trace!("close on an already closed client");
            return;
        }
        self.timer = None;
        self.detach();
        tracing::info!(url = %self.url, "push client closed");
        self.publish(ConnectionState::Closed);
    }

    fn reconnect(&mut self) {
        self.timer = None;
        self.detach();
        self.retry.reconnect();
        tracing::info!(url = %self.url, "manual reconnect");
        self.attach();
    }

    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Next event from the live transport; pends forever when there is none.
/// A stream that ends without reporting an error counts as one.
async fn next_event(handle: &mut Option<ConnectionHandle>) -> TransportEvent {
    match handle {
        Some(handle) => handle.events.next().await.unwrap_or_else(|| {
            TransportEvent::Error(TransportError::new("connection ended"))
        }),
        None => std::future::pending().await,
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::stream;

    struct OpenOnly;

    impl Transport for OpenOnly {
        fn open(&self, _url: &str) -> BoxStream<'static, TransportEvent> {
            stream::iter(vec![TransportEvent::Open])
                .chain(stream::pending())
                .boxed()
        }
    }

    fn client() -> StreamClient {
        StreamClient {
            url: "http://kiosk.local/events".into(),
            policy: ReconnectPolicy::new(true, Duration::from_millis(50), Duration::from_millis(50)),
            transport: Arc::new(OpenOnly),
        }
    }

    #[tokio::test]
    async fn reports_open_state() {
        let control = client().connect(StreamHandlers::<serde_json::Value>::new(|_| {}));
        let mut state = control.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Open)
            .await
            .unwrap();
        assert_eq!(control.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn dropping_every_control_ends_the_task() {
        let control = client().connect(StreamHandlers::<serde_json::Value>::new(|_| {}));
        let mut state = control.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Open)
            .await
            .unwrap();

        drop(control);
        // Sender side goes away once the task exits.
        while state.changed().await.is_ok() {}
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }
}
