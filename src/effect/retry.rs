//! Retrying and time-bounding effects.
//!
//! These combinators sleep on the tokio timer, so the effects they build must
//! be run inside a tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future;
use futures::FutureExt;

use crate::connection::Connection;
use crate::effect::{Effect, Settled};
use crate::error::{Cancelled, Failure};
use crate::retry::{RetryPolicy, TimeoutError};

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Run this effect again after each failure, waiting as `policy` says.
    ///
    /// The last failure propagates once the policy gives up. If the execution
    /// is cancelled between attempts the effect settles with [`Cancelled`]
    /// instead.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use undertow::{Effect, RetryPolicy};
    ///
    /// # tokio_test::block_on(async {
    /// let calls = Arc::new(AtomicU32::new(0));
    /// let counter = calls.clone();
    /// let flaky = Effect::invoke(move || match counter.fetch_add(1, Ordering::SeqCst) {
    ///     0 | 1 => Err("not yet".to_string()),
    ///     n => Ok(n),
    /// });
    ///
    /// let policy = RetryPolicy::constant(Duration::from_millis(1)).with_max_retries(5);
    /// assert_eq!(flaky.retry(policy).execute().await, Ok(2));
    /// # });
    /// ```
    pub fn retry(self, policy: RetryPolicy) -> Effect<A, E> {
        self.retry_if(policy, |_| true)
    }

    /// Like [`retry`](Self::retry), but only failures matching `should_retry`
    /// are retried; any other failure propagates at once.
    pub fn retry_if<P>(self, policy: RetryPolicy, should_retry: P) -> Effect<A, E>
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let should_retry = Arc::new(should_retry);
        Effect::from_run(move |connection| {
            let effect = self.clone();
            let should_retry = Arc::clone(&should_retry);
            async move {
                let mut attempt = 0u32;
                loop {
                    let Settled { result, resume_on } = effect.run_with(connection.clone()).await;
                    let error = match result {
                        Ok(value) => {
                            return Settled {
                                result: Ok(value),
                                resume_on,
                            }
                        }
                        Err(error) => error,
                    };

                    if connection.is_cancelled() {
                        tracing::debug!(?error, "execution cancelled, not retrying");
                        return Settled::new(Err(E::from(Cancelled)));
                    }
                    if !should_retry(&error) {
                        return Settled::new(Err(error));
                    }
                    let Some(delay) = policy.delay_for_attempt(attempt) else {
                        tracing::debug!(attempts = attempt + 1, ?error, "giving up after retries");
                        return Settled::new(Err(error));
                    };

                    tracing::debug!(attempt = attempt + 1, ?delay, ?error, "retrying failed effect");
                    if !sleep_unless_cancelled(&connection, delay).await {
                        return Settled::new(Err(E::from(Cancelled)));
                    }
                    attempt += 1;
                }
            }
            .boxed()
        })
    }

    /// Fail with [`TimeoutError::Timeout`] if this effect has not settled
    /// within `duration`.
    ///
    /// The effect runs under its own connection, linked to the execution's.
    /// On expiry that connection is cancelled and its hooks (bracket
    /// releases included) finish before the timeout is reported. A bracket
    /// release that had already started runs to completion in the background.
    pub fn timeout(self, duration: Duration) -> Effect<A, TimeoutError<E>> {
        Effect::from_run(move |parent| {
            let effect = self.clone();
            async move {
                let (connection, link) = parent.child();
                let mut run = effect.run_with(connection.clone());

                let settled = match tokio::time::timeout(duration, &mut run).await {
                    Ok(Settled { result, resume_on }) => Settled {
                        result: result.map_err(TimeoutError::Inner),
                        resume_on,
                    },
                    Err(_) => {
                        tracing::debug!(?duration, "effect timed out, cancelling it");
                        connection.cancel_now().await;
                        Settled::new(Err(TimeoutError::Timeout { duration }))
                    }
                };

                if let Some(link) = link {
                    parent.remove(link);
                }
                settled
            }
            .boxed()
        })
    }
}

/// Sleep for `delay`, returning `false` if `connection` is cancelled first.
async fn sleep_unless_cancelled(connection: &Connection, delay: Duration) -> bool {
    let (tx, rx) = oneshot::channel::<()>();
    let hook = Box::new(move || {
        let _ = tx.send(());
        future::ready(()).boxed()
    });
    let Some(key) = connection.push_hook(hook) else {
        return false;
    };

    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            connection.remove(key);
            true
        }
        _ = rx => false,
    }
}
