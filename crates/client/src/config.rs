//! Transport timing knobs.
//!
//! Compiled defaults, each overridable via a `CDX_*` env var. Tests override
//! through [`Tunables`] fields directly instead of the environment.

use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Timing configuration for one agent session.
#[derive(Debug, Clone)]
pub struct Tunables {
    /// Delay between TCP readiness probes during startup.
    pub ready_poll: Duration,
    /// Overall readiness deadline for the spawned server.
    pub ready_timeout: Duration,
    /// WebSocket handshake deadline.
    pub handshake_timeout: Duration,
    /// Read-idle deadline; any inbound frame refreshes it.
    pub read_idle: Duration,
    /// Ping cadence.
    pub ping_interval: Duration,
    /// Per-write deadline.
    pub write_deadline: Duration,
    /// Default per-call deadline.
    pub call_timeout: Duration,
    /// Reconnect attempts before the read loop gives up.
    pub reconnect_max_retries: u32,
    /// Base delay for the exponential reconnect backoff.
    pub reconnect_base: Duration,
    /// Backoff cap.
    pub reconnect_max_delay: Duration,
    /// Stderr lines surfaced per second before sampling kicks in.
    pub stderr_lines_per_sec: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            ready_poll: Duration::from_millis(env_u64("CDX_READY_POLL_MS", 300)),
            ready_timeout: Duration::from_secs(env_u64("CDX_READY_TIMEOUT_SECS", 30)),
            handshake_timeout: Duration::from_secs(env_u64("CDX_HANDSHAKE_TIMEOUT_SECS", 5)),
            read_idle: Duration::from_secs(env_u64("CDX_READ_IDLE_SECS", 75)),
            ping_interval: Duration::from_secs(env_u64("CDX_PING_INTERVAL_SECS", 30)),
            write_deadline: Duration::from_secs(env_u64("CDX_WRITE_DEADLINE_SECS", 10)),
            call_timeout: Duration::from_secs(env_u64("CDX_CALL_TIMEOUT_SECS", 30)),
            reconnect_max_retries: env_u64("CDX_RECONNECT_RETRIES", 3) as u32,
            reconnect_base: Duration::from_millis(env_u64("CDX_RECONNECT_BASE_MS", 500)),
            reconnect_max_delay: Duration::from_millis(env_u64("CDX_RECONNECT_MAX_DELAY_MS", 10_000)),
            stderr_lines_per_sec: env_u64("CDX_STDERR_LINES_PER_SEC", 20) as u32,
        }
    }
}

impl Tunables {
    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// Attempt 1 is immediate; attempt k waits `base * 2^(k-2)`, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.reconnect_base
            .checked_mul(factor)
            .unwrap_or(self.reconnect_max_delay)
            .min(self.reconnect_max_delay)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
