//! Bracket pattern for safe resource management.
//!
//! A bracket acquires a resource, uses it, and releases it exactly once, no
//! matter how the use stage ends:
//!
//! - use succeeds: release runs with [`ExitCase::Completed`]
//! - use fails: release runs with [`ExitCase::Error`] before the failure propagates
//! - the execution is cancelled while use is in flight: release runs with
//!   [`ExitCase::Canceled`] as a cancellation hook of the governing
//!   [`Connection`](crate::Connection)
//!
//! Release never runs if acquisition fails. Release effects run under their
//! own connection, so cancelling the execution cannot interrupt them. Once
//! started, a release also runs to completion when the bracket itself is
//! dropped, as happens on [`Disposable::dispose`](crate::Disposable::dispose)
//! or when a [`timeout`](Effect::timeout) expires.
//!
//! The use stage runs under a connection owned by the bracket. Cancelling the
//! bracket cancels that connection before releasing, so nested brackets
//! release the innermost resource first.
//!
//! # Release failures
//!
//! [`Effect::bracket_case`] keeps the error channel of the use stage. When use
//! succeeds and release fails, the release failure becomes the result. When
//! both fail, the use failure wins and the release failure is logged. Use
//! [`Effect::bracket_full`] to observe both through [`BracketError`].
//!
//! # Example
//!
//! ```rust
//! use undertow::{Effect, ExitCase};
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::<_, String>::just("handle")
//!     .bracket_case(
//!         |handle| Effect::just(format!("read from {}", handle)),
//!         |handle, exit| {
//!             assert_eq!(exit, ExitCase::Completed);
//!             Effect::invoke(move || {
//!                 println!("closing {}", handle);
//!                 Ok(())
//!             })
//!         },
//!     );
//!
//! assert_eq!(effect.execute().await, Ok("read from handle".to_string()));
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future;
use futures::FutureExt;

use crate::connection::{Connection, Hook};
use crate::context::spawn_detached;
use crate::effect::{Effect, Settled};
use crate::error::{Cancelled, Failure};

// ============================================================================
// ExitCase
// ============================================================================

/// How the use stage of a bracket finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCase<E> {
    /// Use produced a value.
    Completed,
    /// Use failed with the given error.
    Error(E),
    /// The execution was cancelled while use was in flight.
    Canceled,
}

impl<E> ExitCase<E> {
    /// Returns the use error, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            ExitCase::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if use was cancelled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ExitCase::Canceled)
    }
}

// ============================================================================
// BracketError
// ============================================================================

/// Error type for [`Effect::bracket_full`].
///
/// Each variant identifies which phase of the bracket failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketError<E> {
    /// Resource acquisition failed - never got to use the resource.
    AcquireError(E),
    /// The use function failed, cleanup succeeded.
    UseError(E),
    /// The use function succeeded, cleanup failed.
    CleanupError(E),
    /// Both use and cleanup failed.
    Both {
        /// The error from the use function
        use_error: E,
        /// The error from the cleanup function
        cleanup_error: E,
    },
}

impl<E> BracketError<E> {
    /// Returns the acquire error, if any.
    pub fn acquire_error(&self) -> Option<&E> {
        match self {
            BracketError::AcquireError(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the use error, if any.
    pub fn use_error(&self) -> Option<&E> {
        match self {
            BracketError::UseError(e) | BracketError::Both { use_error: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Returns the cleanup error, if any.
    pub fn cleanup_error(&self) -> Option<&E> {
        match self {
            BracketError::CleanupError(e)
            | BracketError::Both {
                cleanup_error: e, ..
            } => Some(e),
            _ => None,
        }
    }
}

impl<E: From<Cancelled>> From<Cancelled> for BracketError<E> {
    fn from(cancelled: Cancelled) -> Self {
        BracketError::UseError(E::from(cancelled))
    }
}

impl<E: fmt::Display> fmt::Display for BracketError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketError::AcquireError(e) => write!(f, "acquire failed: {}", e),
            BracketError::UseError(e) => write!(f, "{}", e),
            BracketError::CleanupError(e) => write!(f, "cleanup failed: {}", e),
            BracketError::Both {
                use_error,
                cleanup_error,
            } => write!(
                f,
                "use failed: {}; cleanup also failed: {}",
                use_error, cleanup_error
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BracketError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BracketError::AcquireError(e)
            | BracketError::UseError(e)
            | BracketError::CleanupError(e)
            | BracketError::Both { use_error: e, .. } => Some(e),
        }
    }
}

// ============================================================================
// Bracket combinators
// ============================================================================

impl<A, E> Effect<A, E>
where
    A: Clone + Send + Sync + 'static,
    E: Failure + Clone,
{
    /// Use the resource acquired by this effect and release it exactly once.
    ///
    /// `release` receives the resource and the [`ExitCase`] of `use_fn`. See
    /// the [module documentation](self) for how release failures are
    /// reported.
    pub fn bracket_case<B, U, R>(self, use_fn: U, release: R) -> Effect<B, E>
    where
        B: Send + 'static,
        U: Fn(A) -> Effect<B, E> + Send + Sync + 'static,
        R: Fn(A, ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        self.guarded(use_fn, release, |e| e, subordinate_release)
    }

    /// [`bracket_case`](Self::bracket_case) with a release that ignores the
    /// exit case.
    pub fn bracket<B, U, R>(self, use_fn: U, release: R) -> Effect<B, E>
    where
        B: Send + 'static,
        U: Fn(A) -> Effect<B, E> + Send + Sync + 'static,
        R: Fn(A) -> Effect<(), E> + Send + Sync + 'static,
    {
        self.bracket_case(use_fn, move |resource, _| release(resource))
    }

    /// Bracket reporting every failure through [`BracketError`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::{BracketError, Effect};
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<_, String>::just(1).bracket_full(
    ///     |_| Effect::<i32, _>::raise_error("use".to_string()),
    ///     |_, _| Effect::raise_error("cleanup".to_string()),
    /// );
    ///
    /// assert_eq!(
    ///     effect.execute().await,
    ///     Err(BracketError::Both {
    ///         use_error: "use".to_string(),
    ///         cleanup_error: "cleanup".to_string(),
    ///     })
    /// );
    /// # });
    /// ```
    pub fn bracket_full<B, U, R>(self, use_fn: U, release: R) -> Effect<B, BracketError<E>>
    where
        B: Send + 'static,
        U: Fn(A) -> Effect<B, E> + Send + Sync + 'static,
        R: Fn(A, ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        self.guarded(use_fn, release, BracketError::AcquireError, report_both)
    }

    /// Run `finalizer` with the [`ExitCase`] of this effect once it ends.
    ///
    /// The finalizer runs on success, on failure, and when the execution is
    /// cancelled while this effect is in flight.
    pub fn guarantee_case<F>(self, finalizer: F) -> Effect<A, E>
    where
        F: Fn(ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        Effect::just(()).bracket_case(move |()| self.clone(), move |(), exit| finalizer(exit))
    }

    fn guarded<B, E2, U, R>(
        self,
        use_fn: U,
        release: R,
        on_acquire_error: fn(E) -> E2,
        settle: fn(Result<B, E>, Result<(), E>) -> Result<B, E2>,
    ) -> Effect<B, E2>
    where
        B: Send + 'static,
        E2: Failure,
        U: Fn(A) -> Effect<B, E> + Send + Sync + 'static,
        R: Fn(A, ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        let use_fn = Arc::new(use_fn);
        let release = Arc::new(release);
        Effect::from_run(move |connection| {
            let acquire = self.run_with(connection.clone());
            let use_fn = Arc::clone(&use_fn);
            let release = Arc::clone(&release);
            async move {
                acquire
                    .await
                    .then(move |acquired| async move {
                        let resource = match acquired {
                            Ok(resource) => resource,
                            Err(error) => return Settled::new(Err(on_acquire_error(error))),
                        };

                        let released = Arc::new(AtomicBool::new(false));
                        let scope = Connection::new();
                        let hook = release_on_cancel(
                            Arc::clone(&released),
                            scope.clone(),
                            Arc::clone(&release),
                            resource.clone(),
                        );
                        let Some(key) = connection.push_hook(hook) else {
                            // Cancelled before use could start; the hook has
                            // already released the resource.
                            return Settled::new(Err(E2::from(Cancelled)));
                        };

                        let Settled {
                            result: used,
                            resume_on,
                        } = use_fn(resource.clone()).run_with(scope).await;
                        connection.remove(key);

                        if released.swap(true, Ordering::AcqRel) {
                            return Settled {
                                result: Err(E2::from(Cancelled)),
                                resume_on,
                            };
                        }

                        let exit = match &used {
                            Ok(_) => ExitCase::Completed,
                            Err(error) => ExitCase::Error(error.clone()),
                        };
                        let outcome = shielded(release(resource, exit)).await;
                        Settled {
                            result: settle(used, outcome),
                            resume_on,
                        }
                    })
                    .await
            }
            .boxed()
        })
    }
}

/// Cancel the use stage running under `scope`, then release with
/// [`ExitCase::Canceled`], unless use has already settled.
fn release_on_cancel<A, E, R>(
    released: Arc<AtomicBool>,
    scope: Connection,
    release: Arc<R>,
    resource: A,
) -> Hook
where
    A: Send + 'static,
    E: Failure,
    R: Fn(A, ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static,
{
    Box::new(move || {
        if released.swap(true, Ordering::AcqRel) {
            return future::ready(()).boxed();
        }
        async move {
            scope.cancel_now().await;
            if let Err(error) = release(resource, ExitCase::Canceled).execute().await {
                tracing::warn!(?error, "release after cancellation failed");
            }
        }
        .boxed()
    })
}

/// Run `release` as a detached task and wait for its outcome.
///
/// Dropping the returned future stops the wait, not the release.
async fn shielded<E: Failure>(release: Effect<(), E>) -> Result<(), E> {
    let (tx, rx) = oneshot::channel();
    spawn_detached(
        async move {
            let _ = tx.send(release.execute().await);
        }
        .boxed(),
    );
    match rx.await {
        Ok(outcome) => outcome,
        Err(oneshot::Canceled) => {
            tracing::warn!("release task ended without reporting an outcome");
            Err(E::from(Cancelled))
        }
    }
}

fn subordinate_release<B, E: Failure>(used: Result<B, E>, released: Result<(), E>) -> Result<B, E> {
    match (used, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_error)) => Err(release_error),
        (Err(use_error), Ok(())) => Err(use_error),
        (Err(use_error), Err(release_error)) => {
            tracing::warn!(
                ?use_error,
                ?release_error,
                "release failed after use failed; keeping the use error"
            );
            Err(use_error)
        }
    }
}

fn report_both<B, E>(used: Result<B, E>, released: Result<(), E>) -> Result<B, BracketError<E>> {
    match (used, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup_error)) => Err(BracketError::CleanupError(cleanup_error)),
        (Err(use_error), Ok(())) => Err(BracketError::UseError(use_error)),
        (Err(use_error), Err(cleanup_error)) => Err(BracketError::Both {
            use_error,
            cleanup_error,
        }),
    }
}
