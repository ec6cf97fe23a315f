//! Reconnect bookkeeping, kept free of I/O so every transition can be
//! checked without a transport or a clock.

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Connection state as seen from outside the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// A transport is being opened.  `attempt` counts failures since the
    /// last successful open.
    Connecting { attempt: u32 },
    /// The transport reported a successful open.
    Open,
    /// Waiting `delay` before opening a new transport.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Transport failed with reconnect disabled.  Only a manual
    /// `reconnect()` brings the client back.
    Stopped,
    /// Closed by the caller.
    Closed,
}

/// What the client does about a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorAction {
    /// Client is closed; nothing to do.
    Ignore,
    /// Reconnect disabled; drop the transport for good.
    Stop,
    /// A reconnect timer is already pending.
    AlreadyScheduled,
    /// Drop the transport and reopen after `delay`.
    Schedule(Duration),
}

#[derive(Debug, Default)]
pub(crate) struct ReconnectState {
    attempt: u32,
    scheduled: bool,
    closed: bool,
}

impl ReconnectState {
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn on_open(&mut self) {
        self.attempt = 0;
    }

    pub(crate) fn on_transport_error(&mut self, policy: &ReconnectPolicy) -> ErrorAction {
        if self.closed {
            return ErrorAction::Ignore;
        }
        if !policy.enabled() {
            return ErrorAction::Stop;
        }
        if self.scheduled {
            return ErrorAction::AlreadyScheduled;
        }

        let delay = policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.scheduled = true;
        ErrorAction::Schedule(delay)
    }

    /// The reconnect timer elapsed.  Returns whether to open a new
    /// transport (false if a close slipped in before the timer fired).
    pub(crate) fn on_timer_fired(&mut self) -> bool {
        self.scheduled = false;
        !self.closed
    }

    /// Returns false if already closed.
    pub(crate) fn close(&mut self) -> bool {
        let was_open = !self.closed;
        self.closed = true;
        self.scheduled = false;
        was_open
    }

    pub(crate) fn reconnect(&mut self) {
        self.closed = false;
        self.scheduled = false;
        self.attempt = 0;
    }
}
