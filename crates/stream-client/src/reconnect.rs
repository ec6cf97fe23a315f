//! Reconnect policy with capped exponential back-off.

use std::time::Duration;

use crate::config::{
    resolve_bool, resolve_int, ConfigSource, EnvSource, RECONNECT_BASE_DELAY_MS,
    RECONNECT_ENABLED, RECONNECT_MAX_DELAY_MS,
};

pub const DEFAULT_BASE_DELAY_MS: i64 = 3_000;
pub const BASE_DELAY_BOUNDS_MS: (i64, i64) = (50, 60_000);
pub const DEFAULT_MAX_DELAY_MS: i64 = 30_000;
pub const MAX_DELAY_BOUNDS_MS: (i64, i64) = (50, 300_000);

/// Shortest delay any policy will use, however it was built.
pub const MIN_DELAY: Duration = Duration::from_millis(BASE_DELAY_BOUNDS_MS.0 as u64);

/// Controls whether and how fast the client reconnects after a transport
/// error.  Resolved once per client; never changes afterwards.
///
/// `max_delay` is always at least `base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    enabled: bool,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            true,
            Duration::from_millis(DEFAULT_BASE_DELAY_MS as u64),
            Duration::from_millis(DEFAULT_MAX_DELAY_MS as u64),
        )
    }
}

impl ReconnectPolicy {
    /// Build a policy.  `base_delay` is raised to at least [`MIN_DELAY`];
    /// a `max_delay` below `base_delay` is raised to it.
    pub fn new(enabled: bool, base_delay: Duration, max_delay: Duration) -> Self {
        let base_delay = base_delay.max(MIN_DELAY);
        Self {
            enabled,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Never retry: a transport error stops the client.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Resolve the three reconnect tunables from `source`.
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let enabled = resolve_bool(source, RECONNECT_ENABLED, true);
        let base_ms = resolve_int(
            source,
            RECONNECT_BASE_DELAY_MS,
            DEFAULT_BASE_DELAY_MS,
            BASE_DELAY_BOUNDS_MS.0,
            BASE_DELAY_BOUNDS_MS.1,
        );
        let max_ms = resolve_int(
            source,
            RECONNECT_MAX_DELAY_MS,
            DEFAULT_MAX_DELAY_MS,
            MAX_DELAY_BOUNDS_MS.0,
            MAX_DELAY_BOUNDS_MS.1,
        );

        // Bounds keep both values positive.
        Self::new(
            enabled,
            Duration::from_millis(base_ms as u64),
            Duration::from_millis(max_ms as u64),
        )
    }

    /// Resolve from `KIOSK_RECONNECT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&EnvSource::new())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before reconnecting after `attempt` consecutive failures
    /// (0-indexed): `min(base * 2^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
    }
}
