//! Prelude module for convenient imports.
//!
//! Brings the effect type and everything needed to build, compose, and run
//! effects into scope with a single `use`.
//!
//! ```rust
//! use undertow::effect::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::<_, String>::just(21)
//!     .bracket_case(
//!         |x| Effect::just(x * 2),
//!         |_, exit| {
//!             assert_eq!(exit, ExitCase::Completed);
//!             Effect::just(())
//!         },
//!     );
//!
//! assert_eq!(effect.execute().await, Ok(42));
//! # });
//! ```

pub use crate::connection::Connection;
pub use crate::context::ExecutionContext;
pub use crate::effect::{BracketError, Callback, Disposable, Effect, ExitCase};
pub use crate::either::Either;
pub use crate::error::{Cancelled, Failure};
pub use crate::retry::{RetryPolicy, TimeoutError};
