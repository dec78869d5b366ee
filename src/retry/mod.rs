//! Backoff configuration for retrying effects.
//!
//! A [`RetryPolicy`] is plain data describing how long to wait before each
//! retry and when to give up. [`Effect::retry`](crate::Effect::retry) and
//! [`Effect::retry_if`](crate::Effect::retry_if) interpret it.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use undertow::{Effect, RetryPolicy};
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::exponential(Duration::from_millis(1)).with_max_retries(3);
//! let effect = Effect::<_, String>::just(42).retry(policy);
//!
//! assert_eq!(effect.execute().await, Ok(42));
//! # });
//! ```
//!
//! # Backoff
//!
//! - **Constant**: the same delay before every retry
//! - **Linear**: `base * (n + 1)`
//! - **Exponential**: `base * 2^n`
//! - **Fibonacci**: `base * fib(n + 1)`
//!
//! With the `serde` feature, policies can be loaded from configuration:
//!
//! ```rust,ignore
//! let policy: RetryPolicy = serde_json::from_str(
//!     r#"{"backoff":{"Exponential":{"secs":0,"nanos":100000000}},"max_retries":5,"max_delay":null}"#,
//! )?;
//! ```

mod error;
mod policy;

pub use error::TimeoutError;
pub use policy::{Backoff, RetryPolicy};
