//! Retry policy values.

use std::time::Duration;

/// How long to wait before the `n`th retry (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Backoff {
    /// Fixed delay.
    Constant(Duration),
    /// `base * (n + 1)`.
    Linear(Duration),
    /// `base * 2^n`.
    Exponential(Duration),
    /// `base * fib(n + 1)`.
    Fibonacci(Duration),
}

/// When and how often a failed effect is run again.
///
/// Policies are pure data: cheap to copy, compare, and (with the `serde`
/// feature) load from configuration. A policy without `max_retries` retries
/// until the effect succeeds or its execution is cancelled.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use undertow::RetryPolicy;
///
/// let policy = RetryPolicy::exponential(Duration::from_millis(100))
///     .with_max_retries(4)
///     .with_max_delay(Duration::from_millis(500));
///
/// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
/// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(500)));
/// assert_eq!(policy.delay_for_attempt(4), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    backoff: Backoff,
    max_retries: Option<u32>,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    fn from_backoff(backoff: Backoff) -> Self {
        RetryPolicy {
            backoff,
            max_retries: None,
            max_delay: None,
        }
    }

    /// Wait `delay` before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self::from_backoff(Backoff::Constant(delay))
    }

    /// Wait `base`, `2 * base`, `3 * base`, ...
    pub fn linear(base: Duration) -> Self {
        Self::from_backoff(Backoff::Linear(base))
    }

    /// Wait `base`, `2 * base`, `4 * base`, ...
    pub fn exponential(base: Duration) -> Self {
        Self::from_backoff(Backoff::Exponential(base))
    }

    /// Wait `base`, `base`, `2 * base`, `3 * base`, `5 * base`, ...
    pub fn fibonacci(base: Duration) -> Self {
        Self::from_backoff(Backoff::Fibonacci(base))
    }

    /// Give up after `n` retries, i.e. after `n + 1` runs in total.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Never wait longer than `cap` between runs.
    pub fn with_max_delay(mut self, cap: Duration) -> Self {
        self.max_delay = Some(cap);
        self
    }

    /// The backoff shape.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// The retry limit, if any.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// The delay cap, if any.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Delay before retry number `attempt` (0-indexed), or `None` once the
    /// retry limit is reached.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| attempt >= max) {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Constant(delay) => delay,
            Backoff::Linear(base) => base.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential(base) => base.saturating_mul(2u32.saturating_pow(attempt)),
            Backoff::Fibonacci(base) => base.saturating_mul(fibonacci(attempt.saturating_add(1))),
        };

        Some(match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        })
    }
}

fn fibonacci(n: u32) -> u32 {
    let (mut a, mut b) = (0u32, 1u32);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}
