//! Running effects.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable, Aborted};
use futures::FutureExt;

use crate::connection::Connection;
use crate::context::spawn_detached;
use crate::effect::{Effect, Settled};
use crate::error::{Cancelled, Failure};

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Run this effect to completion under a fresh [`Connection`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let result = Effect::<_, String>::just(42).execute().await;
    /// assert_eq!(result, Ok(42));
    /// # });
    /// ```
    pub async fn execute(&self) -> Result<A, E> {
        self.execute_with(&Connection::new()).await
    }

    /// Run this effect to completion under `connection`.
    ///
    /// Cancelling `connection` from elsewhere runs the cleanup registered by
    /// the effect while it is in flight.
    pub async fn execute_with(&self, connection: &Connection) -> Result<A, E> {
        self.run_with(connection.clone()).await.result
    }

    /// Describe running this effect and handing its outcome to `cb`.
    ///
    /// When the returned effect runs, this effect runs, `cb` is called exactly
    /// once with the outcome, and the effect `cb` returns runs in turn. The
    /// returned effect settles with that effect's outcome. If an execution
    /// context drops the step that would call `cb`, `cb` is called with
    /// [`Cancelled`] instead.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::{Arc, Mutex};
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let seen = Arc::new(Mutex::new(None));
    /// let sink = seen.clone();
    /// let effect = Effect::<_, String>::just(42).run_async(move |result| {
    ///     *sink.lock().unwrap() = Some(result);
    ///     Effect::just(())
    /// });
    ///
    /// assert_eq!(*seen.lock().unwrap(), None);
    /// effect.execute().await.unwrap();
    /// assert_eq!(*seen.lock().unwrap(), Some(Ok(42)));
    /// # });
    /// ```
    pub fn run_async<F>(self, cb: F) -> Effect<(), E>
    where
        F: Fn(Result<A, E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        let cb = Arc::new(cb);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection.clone());
            let cb = Arc::clone(&cb);
            async move {
                let delivered = Arc::new(AtomicBool::new(false));
                let settled = {
                    let cb = Arc::clone(&cb);
                    let delivered = Arc::clone(&delivered);
                    let connection = connection.clone();
                    upstream
                        .await
                        .then(move |result| async move {
                            if delivered.swap(true, Ordering::AcqRel) {
                                return Settled::new(Err(E::from(Cancelled)));
                            }
                            cb(result).run_with(connection).await
                        })
                        .await
                };
                if delivered.swap(true, Ordering::AcqRel) {
                    return settled;
                }
                // The execution context dropped the continuation before `cb` ran.
                cb(Err(E::from(Cancelled))).run_with(connection).await
            }
            .boxed()
        })
    }

    /// Describe starting this effect in the background.
    ///
    /// When the returned effect runs, a new execution of this effect starts
    /// under its own [`Connection`] and a [`Disposable`] for it is returned.
    /// The disposable exists before the execution starts, so there is no
    /// window in which the run cannot be cancelled.
    ///
    /// On settlement `cb` is called once and the effect it returns is run;
    /// its failure is logged. After [`Disposable::dispose`], `cb` is never
    /// called.
    ///
    /// The execution is driven on the current tokio runtime, or a dedicated
    /// thread outside of one.
    pub fn run_async_cancellable<F>(self, cb: F) -> Effect<Disposable, E>
    where
        F: Fn(Result<A, E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        let run = self.run_async(cb);
        Effect::from_run(move |_| {
            let connection = Connection::new();
            let (abort, registration) = AbortHandle::new_pair();
            let disposable = Disposable {
                connection: connection.clone(),
                abort,
            };

            let execution = Abortable::new(run.run_with(connection), registration);
            spawn_detached(
                async move {
                    match execution.await {
                        Ok(Settled { result: Ok(()), .. }) => {}
                        Ok(Settled {
                            result: Err(error), ..
                        }) => {
                            tracing::warn!(?error, "callback of a cancellable run failed");
                        }
                        Err(Aborted) => {
                            tracing::debug!("cancellable run disposed before settlement");
                        }
                    }
                }
                .boxed(),
            );

            futures::future::ready(Settled::new(Ok(disposable))).boxed()
        })
    }
}

/// Handle for cancelling one execution started by
/// [`Effect::run_async_cancellable`].
///
/// Disposing is idempotent and may happen at any time; after settlement it is
/// a no-op.
#[derive(Clone)]
pub struct Disposable {
    connection: Connection,
    abort: AbortHandle,
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Disposable {
    /// Request cancellation of the execution.
    ///
    /// The completion callback will not be called afterwards. Cleanup
    /// registered on the execution's connection runs in the background.
    pub fn dispose(&self) {
        self.abort.abort();
        spawn_detached(self.connection.cancel_now());
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.connection.is_cancelled()
    }
}
