use std::time::Duration;
use tracing::trace;

const DEFAULT_MAX_ATTEMPTS: u32 = 30;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(600);

/// How the delay grows between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay multiplied by the attempt number
    Linear,
    /// Delay doubled after every attempt
    Exponential,
}

/// Bounded retry policy applied by the chunk processor.
///
/// Every oracle call counts as one attempt, whether it failed outright or
/// returned an incomplete answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of oracle calls per chunk
    pub max_attempts: u32,

    /// Base delay between attempts
    pub delay: Duration,

    /// Delay growth strategy
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a fixed delay.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Returns a copy of this policy using the given backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns true if another attempt is allowed after `attempts_made`.
    #[must_use]
    pub const fn can_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Attempts left after `attempts_made`.
    #[must_use]
    pub const fn remaining(&self, attempts_made: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts_made)
    }

    /// Delay to wait after the `attempts_made`-th attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let step = attempts_made.max(1);
        let delay = match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(step),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(step - 1).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        };
        delay.min(MAX_BACKOFF_DELAY)
    }

    /// Blocks the current thread for the delay after `attempts_made`.
    pub fn wait(&self, attempts_made: u32) {
        let delay = self.delay_for(attempts_made);
        if delay.is_zero() {
            return;
        }
        trace!("Sleeping {:.1}s before next attempt", delay.as_secs_f64());
        std::thread::sleep(delay);
    }
}
