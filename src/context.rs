//! Execution contexts that effects can hand their continuations to.
//!
//! An [`ExecutionContext`] is anything able to run a `'static` future to
//! completion somewhere else: a tokio runtime, a dedicated pool, a test double.
//! [`Effect::continue_on`](crate::Effect::continue_on) uses it to move
//! downstream work off the current task.
//!
//! # Example
//!
//! ```rust
//! use undertow::Effect;
//!
//! let pool = tokio::runtime::Builder::new_multi_thread()
//!     .worker_threads(1)
//!     .thread_name("pool")
//!     .build()
//!     .unwrap();
//!
//! let effect = Effect::<_, String>::just(20)
//!     .continue_on(pool.handle().clone())
//!     .map(|x| (x + 1, std::thread::current().name().map(String::from)));
//!
//! let (value, thread) = tokio_test::block_on(effect.execute()).unwrap();
//! assert_eq!(value, 21);
//! assert_eq!(thread.as_deref(), Some("pool"));
//! ```

use futures::future::BoxFuture;
use tokio::runtime::Handle;

/// A place where detached futures can be run.
///
/// Implementations must run every spawned future at most once. A context that
/// drops a future without polling it to completion makes the waiting step
/// settle with [`Cancelled`](crate::Cancelled).
pub trait ExecutionContext: Send + Sync + 'static {
    /// Run `task` on this context without waiting for it.
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// Label used in log records.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl ExecutionContext for Handle {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        drop(Handle::spawn(self, task));
    }

    fn name(&self) -> &str {
        "tokio"
    }
}

/// Run `task` without blocking the caller.
///
/// Uses the current tokio runtime when there is one, otherwise a dedicated
/// thread.
pub(crate) fn spawn_detached(task: BoxFuture<'static, ()>) {
    match Handle::try_current() {
        Ok(handle) => {
            drop(handle.spawn(task));
        }
        Err(_) => {
            tracing::trace!("no ambient runtime, running detached task on its own thread");
            std::thread::spawn(move || futures::executor::block_on(task));
        }
    }
}
