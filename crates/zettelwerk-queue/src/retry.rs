// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry delay policy for failed print attempts.
//
// A failed job goes back to pending and becomes claimable again once its
// delay has elapsed.  The default base delay is zero, so failed jobs are
// immediately re-eligible and compete with the rest of the queue purely by
// priority and admission order.

use std::time::Duration;

use zettelwerk_core::QueueConfig;

/// Backoff policy applied between attempts of a single job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.  Zero disables backoff entirely.
    pub base_delay: Duration,
    /// Ceiling on the computed delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: config.retry_base(),
            max_delay: config.retry_max(),
        }
    }

    /// Delay before the next attempt, given the number of failed attempts so
    /// far (1-indexed: the first failure passes 1).
    ///
    /// delay = min(base * 2^(attempts - 1), max_delay)
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let shift = attempts.saturating_sub(1).min(10);
        let delay_ms = base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_base_never_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(5), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }
}
