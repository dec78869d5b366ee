//! # Undertow
//!
//! > *What you don't see is what pulls you under.*
//!
//! Deferred, cancellable, resource-safe asynchronous effects for Rust.
//!
//! An [`Effect<A, E>`] is a *description* of a computation that settles once
//! with an `A` or an `E`. Nothing happens until it is run, and every run
//! re-executes the whole description. Each run is governed by a
//! [`Connection`], a cancellation token holding the cleanup actions of the work
//! in flight.
//!
//! - **Compose** with [`map`](Effect::map), [`flat_map`](Effect::flat_map),
//!   [`ap`](Effect::ap) and [`handle_error_with`](Effect::handle_error_with)
//! - **Bridge** callback APIs with [`Effect::async_callback`]
//! - **Manage resources** with [`bracket_case`](Effect::bracket_case): release
//!   runs exactly once, whether use completes, fails, or is cancelled
//! - **Run** with [`execute`](Effect::execute), or in the background with
//!   [`run_async_cancellable`](Effect::run_async_cancellable) and a
//!   [`Disposable`]
//!
//! ## Quick Example
//!
//! ```rust
//! use undertow::{Effect, ExitCase};
//!
//! # tokio_test::block_on(async {
//! let report = Effect::<_, String>::invoke(|| Ok("db-connection"))
//!     .bracket_case(
//!         |conn| Effect::just(format!("rows read via {}", conn)),
//!         |conn, exit: ExitCase<String>| {
//!             Effect::invoke(move || {
//!                 println!("closing {} after {:?}", conn, exit);
//!                 Ok(())
//!             })
//!         },
//!     )
//!     .map(|rows| rows.to_uppercase());
//!
//! assert_eq!(report.execute().await, Ok("ROWS READ VIA DB-CONNECTION".to_string()));
//! # });
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use undertow::{Connection, Effect};
//!
//! # tokio_test::block_on(async {
//! let connection = Connection::new();
//! let never = Effect::<i32, String>::async_callback(|connection, _callback| {
//!     connection.push(Effect::<_, String>::invoke(|| {
//!         println!("aborting request");
//!         Ok(())
//!     }));
//! });
//!
//! let running = {
//!     let connection = connection.clone();
//!     tokio::spawn(async move { never.execute_with(&connection).await })
//! };
//! tokio::task::yield_now().await;
//! connection.cancel::<String>().execute().await.unwrap();
//!
//! assert_eq!(running.await.unwrap(), Err("execution was cancelled".to_string()));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod connection;
pub mod context;
pub mod effect;
pub mod either;
pub mod error;
pub mod retry;
pub mod testing;

// Re-exports
pub use connection::Connection;
pub use context::ExecutionContext;
pub use effect::{BracketError, Callback, Disposable, Effect, ExitCase};
pub use either::Either;
pub use error::{Cancelled, Failure};
pub use retry::{RetryPolicy, TimeoutError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::effect::prelude::*;
}
