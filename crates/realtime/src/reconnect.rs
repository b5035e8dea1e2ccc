//! Exponential-backoff reconnection policy.
//!
//! When the socket drops unexpectedly, the session task schedules
//! reconnect attempts with increasing delays until either a connection
//! succeeds, the attempt budget is exhausted, or the session is torn
//! down. A device network-state change skips whatever delay is
//! currently pending.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Attempts allowed before the session is declared lost.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Delay scheduled before reconnect attempt number `attempt` (1-based):
/// `base_delay * 2^(attempt-1)`, clamped to [`ReconnectConfig::max_delay`].
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = config.base_delay.saturating_mul(2u32.saturating_pow(exponent));
    delay.min(config.max_delay)
}
