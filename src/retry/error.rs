//! Errors produced by time-bounded effects.

use std::fmt;
use std::time::Duration;

use crate::error::Cancelled;

/// Failure of an effect run under [`Effect::timeout`](crate::Effect::timeout).
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use undertow::{Effect, TimeoutError};
///
/// # tokio_test::block_on(async {
/// let effect = Effect::from_future(|| async {
///     tokio::time::sleep(Duration::from_secs(10)).await;
///     Ok::<_, String>(42)
/// })
/// .timeout(Duration::from_millis(10));
///
/// assert_eq!(
///     effect.execute().await,
///     Err(TimeoutError::Timeout { duration: Duration::from_millis(10) })
/// );
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The effect did not settle in time and was cancelled.
    Timeout {
        /// The limit that was exceeded.
        duration: Duration,
    },
    /// The effect failed before the limit.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Returns `true` if the limit was exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout { .. })
    }

    /// Returns the inner failure, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Timeout { .. } => None,
        }
    }
}

impl<E: From<Cancelled>> From<Cancelled> for TimeoutError<E> {
    fn from(cancelled: Cancelled) -> Self {
        TimeoutError::Inner(E::from(cancelled))
    }
}

impl<E: fmt::Display> fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Timeout { duration } => write!(f, "timed out after {:?}", duration),
            TimeoutError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeoutError::Timeout { .. } => None,
            TimeoutError::Inner(e) => Some(e),
        }
    }
}
