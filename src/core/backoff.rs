//! Reconnect and probe retry policies
//!
//! Policies are plain data with pure delay functions so the schedule can be
//! asserted in tests without running timers.

use std::time::Duration;

/// Backoff schedule for the bridge channel: capped exponential with a
/// rollover so the exponent never grows without bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Exponent rolls over modulo this value.
    pub rollover: u32,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
            rollover: 5,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based):
    /// `min(base * 2^(attempt mod rollover), cap)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let rollover = self.rollover.max(1);
        let exponent = (attempt % rollover).min(31);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.cap)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt >= max,
            None => false,
        }
    }
}

/// Fixed-count, fixed-delay schedule for the scripting-runtime startup
/// probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        ProbePolicy {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}
