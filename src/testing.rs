//! Testing utilities for code built on effects.
//!
//! # Probe
//!
//! A [`Probe`] records labelled events from hooks, callbacks, and releases so
//! tests can assert on what ran and in which order.
//!
//! ```rust
//! use undertow::testing::Probe;
//! use undertow::{Connection, Effect};
//!
//! # tokio_test::block_on(async {
//! let probe = Probe::new();
//! let connection = Connection::new();
//! connection.push(probe.effect::<String>("close socket"));
//! connection.push(probe.effect::<String>("delete temp file"));
//!
//! connection.cancel::<String>().execute().await.unwrap();
//! assert_eq!(probe.events(), vec!["close socket", "delete temp file"]);
//! # });
//! ```
//!
//! # Assertion Macros
//!
//! ```rust
//! use undertow::{assert_fails, assert_succeeds, Effect};
//!
//! # tokio_test::block_on(async {
//! let value = assert_succeeds!(Effect::<_, String>::just(42).execute().await);
//! assert_eq!(value, 42);
//!
//! assert_fails!(
//!     Effect::<i32, _>::raise_error("boom".to_string()).execute().await,
//!     "boom".to_string()
//! );
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::effect::{Effect, ExitCase};
use crate::error::Failure;

/// Shared, thread-safe event recorder.
///
/// Clones record into the same log.
#[derive(Clone, Default)]
pub struct Probe {
    events: Arc<Mutex<Vec<String>>>,
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("events", &*self.events.lock())
            .finish()
    }
}

impl Probe {
    /// Create an empty probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` now.
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// How many times `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// An effect that records `label` each time it runs.
    pub fn effect<E: Failure>(&self, label: &str) -> Effect<(), E> {
        let probe = self.clone();
        let label = label.to_string();
        Effect::invoke(move || {
            probe.record(label.clone());
            Ok(())
        })
    }

    /// A bracket release that records `label:completed`, `label:error`, or
    /// `label:canceled` depending on how the use stage ended.
    pub fn release<A, E>(
        &self,
        label: &str,
    ) -> impl Fn(A, ExitCase<E>) -> Effect<(), E> + Send + Sync + 'static
    where
        A: 'static,
        E: Failure,
    {
        let probe = self.clone();
        let label = label.to_string();
        move |_, exit| {
            let outcome = match exit {
                ExitCase::Completed => "completed",
                ExitCase::Error(_) => "error",
                ExitCase::Canceled => "canceled",
            };
            probe.effect(&format!("{}:{}", label, outcome))
        }
    }
}

/// Assert that a `Result` produced by running an effect is `Ok`.
///
/// Evaluates to the success value. With a second argument, also asserts the
/// value equals it.
#[macro_export]
macro_rules! assert_succeeds {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected success, got failure: {:?}", e),
        }
    };
    ($result:expr, $expected:expr) => {
        match $result {
            Ok(value) => assert_eq!(value, $expected),
            Err(e) => panic!("Expected success, got failure: {:?}", e),
        }
    };
}

/// Assert that a `Result` produced by running an effect is `Err`.
///
/// Evaluates to the failure. With a second argument, also asserts the
/// failure equals it.
#[macro_export]
macro_rules! assert_fails {
    ($result:expr) => {
        match $result {
            Err(e) => e,
            Ok(value) => panic!("Expected failure, got success: {:?}", value),
        }
    };
    ($result:expr, $expected:expr) => {
        match $result {
            Err(e) => assert_eq!(e, $expected),
            Ok(value) => panic!("Expected failure, got success: {:?}", value),
        }
    };
}

#[cfg(feature = "proptest")]
use crate::either::Either;
#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl<L, R> Arbitrary for Either<L, R>
where
    L: Arbitrary + 'static,
    R: Arbitrary + 'static,
{
    type Parameters = (L::Parameters, R::Parameters);
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        let (left, right) = args;
        prop_oneof![
            any_with::<L>(left).prop_map(Either::Left),
            any_with::<R>(right).prop_map(Either::Right),
        ]
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_counts_events() {
        let probe = Probe::new();
        let clone = probe.clone();
        probe.record("a");
        clone.record("b");
        clone.record("a");

        assert_eq!(probe.events(), vec!["a", "b", "a"]);
        assert_eq!(probe.count("a"), 2);
        assert_eq!(probe.count("missing"), 0);
    }

    #[tokio::test]
    async fn release_records_exit_case() {
        let probe = Probe::new();
        let release = probe.release::<i32, String>("file");

        release(1, ExitCase::Completed).execute().await.unwrap();
        release(1, ExitCase::Error("e".to_string())).execute().await.unwrap();
        release(1, ExitCase::Canceled).execute().await.unwrap();

        assert_eq!(
            probe.events(),
            vec!["file:completed", "file:error", "file:canceled"]
        );
    }

    #[test]
    fn assert_succeeds_macro() {
        let value = assert_succeeds!(Ok::<_, String>(42));
        assert_eq!(value, 42);
        assert_succeeds!(Ok::<_, String>(1), 1);
    }

    #[test]
    fn assert_fails_macro() {
        let error = assert_fails!(Err::<i32, _>("boom"));
        assert_eq!(error, "boom");
        assert_fails!(Err::<i32, _>("boom"), "boom");
    }

    #[test]
    #[should_panic(expected = "Expected success, got failure")]
    fn assert_succeeds_panics_on_failure() {
        assert_succeeds!(Err::<i32, _>("boom"));
    }

    #[test]
    #[should_panic(expected = "Expected failure, got success")]
    fn assert_fails_panics_on_success() {
        assert_fails!(Ok::<_, String>(1));
    }

    #[cfg(feature = "proptest")]
    mod proptest_tests {
        use super::*;

        proptest! {
            #[test]
            fn either_arbitrary_generates_both_sides(value in any::<Either<i32, String>>()) {
                prop_assert_ne!(value.is_left(), value.is_right());
            }
        }
    }
}
