//! Dequeue polling policy.

use std::time::Duration;

/// How the delay grows between empty polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// base * 2^(attempt - 1), capped.
    #[default]
    Exponential,
}

/// Bounds how long `dequeue` waits for work before reporting empty.
///
/// The attempt count is the only timeout; there is no cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Claim attempts per dequeue. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first empty attempt.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    pub strategy: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            strategy: Backoff::Exponential,
        }
    }
}

impl PollPolicy {
    /// Try once, never sleep.
    pub fn no_wait() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: Backoff::Exponential,
        }
    }

    /// Number of claim attempts a dequeue makes.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after empty attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Sum of all sleeps a fully empty dequeue performs.
    pub fn total_wait(&self) -> Duration {
        (1..self.attempts())
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}
