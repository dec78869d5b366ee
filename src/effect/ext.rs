//! Combinator methods for composing effects.
//!
//! Each combinator returns a new description; the receiver is left untouched
//! and can still be run or composed elsewhere.

use std::sync::Arc;

use futures::FutureExt;

use crate::context::ExecutionContext;
use crate::effect::{Effect, Settled};
use crate::error::Failure;

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Transform the success value.
    ///
    /// `f` runs at most once per execution, and only on success.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<_, String>::just(21).map(|x| x * 2);
    /// assert_eq!(effect.execute().await, Ok(42));
    /// # });
    /// ```
    pub fn map<B, F>(self, f: F) -> Effect<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection);
            let f = Arc::clone(&f);
            async move {
                upstream
                    .await
                    .then(move |result| async move { Settled::new(result.map(|a| f(a))) })
                    .await
            }
            .boxed()
        })
    }

    /// Chain a dependent effect.
    ///
    /// If this effect fails, `f` is never called and the failure propagates.
    /// Otherwise the effect returned by `f` runs under the same connection.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<_, String>::just(21).flat_map(|x| Effect::just(x * 2));
    /// assert_eq!(effect.execute().await, Ok(42));
    /// # });
    /// ```
    pub fn flat_map<B, F>(self, f: F) -> Effect<B, E>
    where
        B: Send + 'static,
        F: Fn(A) -> Effect<B, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection.clone());
            let f = Arc::clone(&f);
            async move {
                upstream
                    .await
                    .then(move |result| async move {
                        match result {
                            Ok(value) => f(value).run_with(connection).await,
                            Err(error) => Settled::new(Err(error)),
                        }
                    })
                    .await
            }
            .boxed()
        })
    }

    /// Apply the function produced by `ff` to this effect's value.
    ///
    /// Evaluation is sequential: `ff` only runs once this effect has
    /// succeeded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let double = Effect::<_, String>::just(|x: i32| x * 2);
    /// let effect = Effect::just(21).ap(double);
    /// assert_eq!(effect.execute().await, Ok(42));
    /// # });
    /// ```
    pub fn ap<B, F>(self, ff: Effect<F, E>) -> Effect<B, E>
    where
        A: Clone + Sync,
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        self.flat_map(move |value| ff.clone().map(move |f| f(value.clone())))
    }

    /// Recover from a failure with another effect.
    ///
    /// Successes pass through unchanged. If the recovery effect fails, that
    /// failure propagates; recovery is not retried.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<i32, _>::raise_error("boom".to_string())
    ///     .handle_error_with(|e| Effect::just(e.len() as i32));
    /// assert_eq!(effect.execute().await, Ok(4));
    /// # });
    /// ```
    pub fn handle_error_with<F>(self, f: F) -> Effect<A, E>
    where
        F: Fn(E) -> Effect<A, E> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection.clone());
            let f = Arc::clone(&f);
            async move {
                upstream
                    .await
                    .then(move |result| async move {
                        match result {
                            Ok(value) => Settled::new(Ok(value)),
                            Err(error) => f(error).run_with(connection).await,
                        }
                    })
                    .await
            }
            .boxed()
        })
    }

    /// Transform the failure value.
    ///
    /// Useful for converting error types before chaining with effects that
    /// fail differently.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<i32, _>::raise_error("boom".to_string())
    ///     .map_err(|e| std::io::Error::other(e));
    /// assert_eq!(effect.execute().await.unwrap_err().to_string(), "boom");
    /// # });
    /// ```
    pub fn map_err<E2, F>(self, f: F) -> Effect<A, E2>
    where
        E2: Failure,
        F: Fn(E) -> E2 + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection);
            let f = Arc::clone(&f);
            async move {
                upstream
                    .await
                    .then(move |result| async move { Settled::new(result.map_err(|e| f(e))) })
                    .await
            }
            .boxed()
        })
    }

    /// Expose the outcome as a value; the resulting effect never fails.
    ///
    /// # Example
    ///
    /// ```rust
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::<i32, _>::raise_error("boom".to_string()).attempt();
    /// assert_eq!(effect.execute().await, Ok(Err("boom".to_string())));
    /// # });
    /// ```
    pub fn attempt(self) -> Effect<Result<A, E>, E> {
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection);
            async move {
                let Settled { result, resume_on } = upstream.await;
                Settled {
                    result: Ok(result),
                    resume_on,
                }
            }
            .boxed()
        })
    }

    /// Run everything composed after this point on `context`.
    ///
    /// The outcome is unchanged; only the place where downstream steps
    /// execute moves. Downstream steps keep running on `context` until
    /// another `continue_on` picks a different one.
    pub fn continue_on<C>(self, context: C) -> Effect<A, E>
    where
        C: ExecutionContext,
    {
        let context: Arc<dyn ExecutionContext> = Arc::new(context);
        Effect::from_run(move |connection| {
            let upstream = self.run_with(connection);
            let context = Arc::clone(&context);
            async move {
                let mut settled = upstream.await;
                tracing::trace!(context = context.name(), "continuing on execution context");
                settled.resume_on = Some(context);
                settled
            }
            .boxed()
        })
    }
}
