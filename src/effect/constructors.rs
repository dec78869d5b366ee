//! Constructors for effects.
//!
//! Every constructor is lazy: nothing runs until the effect is executed, and
//! each execution evaluates the description afresh.

use std::future::Future;
use std::sync::Arc;

use futures::future;
use futures::FutureExt;

use crate::effect::{Effect, Settled};
use crate::either::Either;
use crate::error::{Cancelled, Failure};

/// How many `tail_rec_m` steps run before the loop yields to its executor.
const YIELD_EVERY: u64 = 1024;

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Create an effect that has already succeeded with `value`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// assert_eq!(Effect::<_, String>::just(42).execute().await, Ok(42));
    /// # });
    /// ```
    pub fn just(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Effect::from_run(move |_| future::ready(Settled::new(Ok(value.clone()))).boxed())
    }

    /// Create an effect that has already failed with `error`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<i32, _>::raise_error("boom".to_string());
    /// assert_eq!(effect.execute().await, Err("boom".to_string()));
    /// # });
    /// ```
    pub fn raise_error(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Effect::from_run(move |_| future::ready(Settled::new(Err(error.clone()))).boxed())
    }

    /// Build an effect from a function evaluated once per execution.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let calls = Arc::new(AtomicUsize::new(0));
    /// let counter = calls.clone();
    /// let effect = Effect::<_, String>::invoke(move || {
    ///     Ok(counter.fetch_add(1, Ordering::SeqCst))
    /// });
    ///
    /// assert_eq!(calls.load(Ordering::SeqCst), 0);
    /// assert_eq!(effect.execute().await, Ok(0));
    /// assert_eq!(effect.execute().await, Ok(1));
    /// # });
    /// ```
    pub fn invoke<F>(thunk: F) -> Self
    where
        F: Fn() -> Result<A, E> + Send + Sync + 'static,
    {
        let thunk = Arc::new(thunk);
        Effect::from_run(move |_| {
            let thunk = Arc::clone(&thunk);
            future::lazy(move |_| Settled::new(thunk())).boxed()
        })
    }

    /// Build an effect from a function producing another effect.
    ///
    /// The function runs once per execution and the effect it returns is run
    /// under the same connection.
    pub fn defer<F>(thunk: F) -> Self
    where
        F: Fn() -> Effect<A, E> + Send + Sync + 'static,
    {
        let thunk = Arc::new(thunk);
        Effect::from_run(move |connection| {
            let thunk = Arc::clone(&thunk);
            async move { thunk().run_with(connection).await }.boxed()
        })
    }

    /// Build an effect from an async function, called once per execution.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::from_future(|| async { Ok::<_, String>(42) });
    /// assert_eq!(effect.execute().await, Ok(42));
    /// # });
    /// ```
    pub fn from_future<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |_| {
            let f = Arc::clone(&f);
            async move { Settled::new(f().await) }.boxed()
        })
    }

    /// Stack-safe loop over effectful steps.
    ///
    /// Runs `f(seed)`; a `Left(next)` runs `f(next)`, a `Right(done)` ends the
    /// loop with `done`. The loop is iterative and awaits each step without
    /// blocking a thread, yielding to the executor periodically. It stops with
    /// [`Cancelled`] when the governing connection is cancelled between steps.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::{Effect, Either};
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<u64, String>::tail_rec_m(0u64, |n| {
    ///     Effect::just(if n < 100_000 { Either::Left(n + 1) } else { Either::Right(n) })
    /// });
    /// assert_eq!(effect.execute().await, Ok(100_000));
    /// # });
    /// ```
    pub fn tail_rec_m<S, F>(seed: S, f: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Effect<Either<S, A>, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |connection| {
            let f = Arc::clone(&f);
            let mut current = seed.clone();
            async move {
                let mut steps: u64 = 0;
                loop {
                    if connection.is_cancelled() {
                        return Settled::new(Err(E::from(Cancelled)));
                    }
                    let Settled { result, resume_on } =
                        f(current).run_with(connection.clone()).await;
                    match result {
                        Ok(Either::Left(next)) => current = next,
                        Ok(Either::Right(done)) => {
                            return Settled {
                                result: Ok(done),
                                resume_on,
                            }
                        }
                        Err(error) => {
                            return Settled {
                                result: Err(error),
                                resume_on,
                            }
                        }
                    }
                    steps += 1;
                    if steps % YIELD_EVERY == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
            .boxed()
        })
    }
}
