// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Bounded retry policy bound to a table connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Number of attempts, no delay between them.
    Immediate(u64),
    /// Number of attempts and a fixed delay in milliseconds between them.
    LinearBackoff(u64, u64),
}

impl Default for RetryStrategy {
    /// Three attempts spread over up to a minute.
    fn default() -> Self {
        RetryStrategy::LinearBackoff(3, 20_000)
    }
}

impl RetryStrategy {
    /// Total attempts, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        match self {
            RetryStrategy::Immediate(attempts) | RetryStrategy::LinearBackoff(attempts, _) => {
                (*attempts).max(1)
            }
        }
    }

    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryStrategy::Immediate(_) => None,
            RetryStrategy::LinearBackoff(_, delay_ms) => Some(Duration::from_millis(*delay_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_are_at_least_one() {
        assert_eq!(RetryStrategy::Immediate(0).attempts(), 1);
        assert_eq!(RetryStrategy::LinearBackoff(3, 10).attempts(), 3);
    }

    #[test]
    fn test_default_fits_in_a_minute() {
        let strategy = RetryStrategy::default();
        let waits = strategy.delay().unwrap() * (strategy.attempts() as u32 - 1);
        assert!(waits <= Duration::from_secs(60));
    }
}
