//! Reconnection backoff strategies.

use std::time::Duration;

/// Decides how long to wait before the next reconnection attempt.
///
/// Implementations are stateful: `next_delay` counts an attempt, `reset`
/// is called once a connection succeeds.
pub trait BackoffStrategy: Send {
    /// Delay before the next attempt, or `None` to give up.
    fn next_delay(&mut self) -> Option<Duration>;

    /// Forget previous failures.
    fn reset(&mut self);

    /// Attempts made since the last reset.
    fn attempts(&self) -> u32;
}

/// Configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of reconnection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// Whether to randomize each delay by ±25%.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).clamp(0.0, self.max_delay.as_millis() as f64)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }
}

/// Bounded exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.delay_for_attempt(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Never reconnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl BackoffStrategy for NoReconnect {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}

    fn attempts(&self) -> u32 {
        0
    }
}
