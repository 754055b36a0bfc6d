//! Retry policy for the startup handshake.

use std::time::Duration;

/// Default delay between handshake attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed { delay: Duration },

    /// Delay grows by `multiplier` per attempt, capped at `max_delay`.
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed {
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(secs.max(0.0))
                }
            }
        }
    }
}

/// How long the handshake keeps trying before giving up.
///
/// The default retries forever with a fixed 200ms delay; the backend gives no
/// readiness signal other than answering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    /// Give up after this many attempts. `None` means unbounded.
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    /// Unbounded retries with a fixed delay.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }

    /// Whether another attempt may follow `attempts` failed ones.
    pub fn allows_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        match self.max_elapsed {
            Some(max) => elapsed + self.backoff.delay_for_attempt(attempts) <= max,
            None => true,
        }
    }
}
