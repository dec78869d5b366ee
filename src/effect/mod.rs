//! Deferred, cancellable asynchronous effects.
//!
//! An [`Effect<A, E>`] *describes* a computation that settles exactly once,
//! with a success `A` or a failure `E`. Building one never runs anything;
//! running it is an explicit act ([`Effect::execute`], [`Effect::run_async`],
//! [`Effect::run_async_cancellable`]). Running the same effect twice runs the
//! whole description twice.
//!
//! # Composition
//!
//! ```rust
//! use undertow::Effect;
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::<_, String>::just(5)
//!     .map(|x| x * 2)
//!     .flat_map(|x| Effect::just(x + 10));
//!
//! assert_eq!(effect.execute().await, Ok(20));
//! # });
//! ```
//!
//! # Error recovery
//!
//! ```rust
//! use undertow::Effect;
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::<i32, _>::raise_error("boom".to_string())
//!     .handle_error_with(|_| Effect::just(0));
//!
//! assert_eq!(effect.execute().await, Ok(0));
//! # });
//! ```
//!
//! # Cloning and equality
//!
//! Effects are reference-counted descriptions: cloning is cheap and a clone
//! compares equal to its original. Two separately built effects are never
//! equal, even if they would produce the same outcome.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::BoxFuture;

use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::error::Cancelled;

pub mod bracket;
pub mod bridge;
mod constructors;
mod ext;
mod instrument;
pub mod prelude;
mod retry;
mod run;

pub use bracket::{BracketError, ExitCase};
pub use bridge::Callback;
pub use run::Disposable;

type RunFn<A, E> = dyn Fn(Connection) -> BoxFuture<'static, Settled<A, E>> + Send + Sync;

/// A deferred description of a computation yielding one success or failure.
///
/// # Type Parameters
///
/// * `A` - The success value
/// * `E` - The failure value; must satisfy [`Failure`](crate::Failure) for
///   the combinators to be available
///
/// # Example
///
/// ```rust
/// use undertow::Effect;
///
/// # tokio_test::block_on(async {
/// let effect: Effect<i32, String> = Effect::invoke(|| Ok(21)).map(|x| x * 2);
/// assert_eq!(effect.execute().await, Ok(42));
/// // Effects are descriptions: running again re-runs them.
/// assert_eq!(effect.execute().await, Ok(42));
/// # });
/// ```
pub struct Effect<A, E> {
    run_fn: Arc<RunFn<A, E>>,
}

impl<A, E> Clone for Effect<A, E> {
    fn clone(&self) -> Self {
        Effect {
            run_fn: Arc::clone(&self.run_fn),
        }
    }
}

// Manual Debug implementation since Fn is not Debug
impl<A, E> fmt::Debug for Effect<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("run_fn", &"<function>")
            .finish()
    }
}

impl<A, E> PartialEq for Effect<A, E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.run_fn, &other.run_fn)
    }
}

impl<A, E> Eq for Effect<A, E> {}

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn from_run<F>(run: F) -> Self
    where
        F: Fn(Connection) -> BoxFuture<'static, Settled<A, E>> + Send + Sync + 'static,
    {
        Effect {
            run_fn: Arc::new(run),
        }
    }

    /// Start one execution under `connection`.
    pub(crate) fn run_with(&self, connection: Connection) -> BoxFuture<'static, Settled<A, E>> {
        (self.run_fn)(connection)
    }
}

/// The settled outcome of one step, plus where the next step must run.
pub(crate) struct Settled<A, E> {
    pub(crate) result: Result<A, E>,
    pub(crate) resume_on: Option<Arc<dyn ExecutionContext>>,
}

impl<A, E> Settled<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(result: Result<A, E>) -> Self {
        Settled {
            result,
            resume_on: None,
        }
    }

    /// Run the continuation `f` on the context this outcome asks for.
    ///
    /// Without a context `f` runs inline. With one, `f` runs in a task spawned
    /// there and its outcome keeps resuming on that context unless `f` picked
    /// another one.
    pub(crate) async fn then<B, E2, F, Fut>(self, f: F) -> Settled<B, E2>
    where
        B: Send + 'static,
        E2: From<Cancelled> + Send + 'static,
        F: FnOnce(Result<A, E>) -> Fut + Send + 'static,
        Fut: Future<Output = Settled<B, E2>> + Send + 'static,
    {
        let Settled { result, resume_on } = self;
        let Some(context) = resume_on else {
            return f(result).await;
        };

        let (tx, rx) = oneshot::channel();
        let hop = Arc::clone(&context);
        context.spawn(Box::pin(async move {
            let mut next = f(result).await;
            next.resume_on.get_or_insert(hop);
            let _ = tx.send(next);
        }));

        match rx.await {
            Ok(next) => next,
            Err(oneshot::Canceled) => {
                tracing::warn!(
                    context = context.name(),
                    "execution context dropped a continuation"
                );
                Settled::new(Err(E2::from(Cancelled)))
            }
        }
    }
}
