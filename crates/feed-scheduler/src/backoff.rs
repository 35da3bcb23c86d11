//! Exponential back-off policies.

use std::time::Duration;

fn exponential(base: Duration, exponent: u32, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Per-symbol fetch retries within one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total fetch attempts per cycle
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential(self.base_delay, attempt, self.max_delay)
    }
}

/// Whole-run circuit breaker over failed cycles and a closed health gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaltPolicy {
    /// Failed cycles in a row before halting
    pub max_consecutive_errors: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// How long the health gate may stay closed before halting
    pub max_unhealthy: Duration,
}

impl Default for HaltPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            max_unhealthy: Duration::from_secs(600),
        }
    }
}

impl HaltPolicy {
    /// Wait after `failed_cycles` failed cycles in a row.
    pub fn delay(&self, failed_cycles: u32) -> Duration {
        exponential(self.base_delay, failed_cycles, self.max_delay)
    }

    pub fn should_halt(&self, failed_cycles: u32) -> bool {
        failed_cycles >= self.max_consecutive_errors
    }

    /// The gate has been closed for `unhealthy` without a completed cycle.
    pub fn should_halt_unhealthy(&self, unhealthy: Duration) -> bool {
        unhealthy >= self.max_unhealthy
    }
}
