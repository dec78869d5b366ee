//! Tracing spans around effect executions.

use futures::FutureExt;
use tracing::Instrument as _;

use crate::effect::Effect;
use crate::error::Failure;

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Run every execution of this effect inside `span`.
    ///
    /// The span is entered whenever the execution is polled, following the
    /// usual [`tracing::Instrument`] pattern for async code. Continuations
    /// composed after this effect are outside the span.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tracing::info_span;
    /// use undertow::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let order_id = 17;
    /// let effect = Effect::<_, String>::just(order_id)
    ///     .map(|id| id * 2)
    ///     .instrument(info_span!("load_order", order_id));
    ///
    /// assert_eq!(effect.execute().await, Ok(34));
    /// # });
    /// ```
    pub fn instrument(self, span: tracing::Span) -> Effect<A, E> {
        Effect::from_run(move |connection| {
            self.run_with(connection).instrument(span.clone()).boxed()
        })
    }
}
