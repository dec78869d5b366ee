//! Bridging callback-based APIs into effects.
//!
//! [`Effect::async_callback`] hands user code a fresh [`Connection`] and a
//! single-use [`Callback`]. The user code starts the external operation,
//! registers whatever cancellation it supports on the connection, and calls
//! the callback when the operation finishes.
//!
//! Cancelling the execution cancels the connection: the registered hooks run
//! first, then a pending callback is settled with
//! [`Cancelled`]. A result delivered after that is ignored, so the consumer
//! never sees a stale success.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use undertow::Effect;
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::<u32, String>::async_callback(|connection, callback| {
//!     let timer = tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!         callback.succeed(7);
//!     });
//!     connection.push(Effect::<_, String>::invoke(move || {
//!         timer.abort();
//!         Ok(())
//!     }));
//! });
//!
//! assert_eq!(effect.execute().await, Ok(7));
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::context::spawn_detached;
use crate::effect::{Effect, Settled};
use crate::error::{Cancelled, Failure};

/// Single-use completion callback handed to bridged code.
///
/// Cloneable and callable from any thread. Only the first completion settles
/// the effect; later ones return `false` and are dropped.
pub struct Callback<A, E> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<A, E>>>>>,
}

impl<A, E> Clone for Callback<A, E> {
    fn clone(&self) -> Self {
        Callback {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<A, E> fmt::Debug for Callback<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<A, E> Callback<A, E> {
    fn channel() -> (Self, oneshot::Receiver<Result<A, E>>) {
        let (tx, rx) = oneshot::channel();
        let callback = Callback {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (callback, rx)
    }

    /// Settle with `result`.
    ///
    /// Returns `true` if this call settled the effect, `false` if it had
    /// already been settled (by an earlier call or by cancellation).
    pub fn complete(&self, result: Result<A, E>) -> bool {
        let Some(sender) = self.slot.lock().take() else {
            return false;
        };
        if sender.send(result).is_err() {
            tracing::trace!("bridged effect settled after its consumer went away");
        }
        true
    }

    /// Settle with a success.
    pub fn succeed(&self, value: A) -> bool {
        self.complete(Ok(value))
    }

    /// Settle with a failure.
    pub fn fail(&self, error: E) -> bool {
        self.complete(Err(error))
    }

    /// Whether the effect has been settled.
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Failure,
{
    /// Lift a callback-based operation into an effect.
    ///
    /// `proc` runs once per execution with a fresh [`Connection`], linked to
    /// the execution's own, and a [`Callback`]. It should start the external
    /// work and push a hook that stops it onto the connection. Once `proc`
    /// returns, the bridge adds its own hook settling a pending callback with
    /// [`Cancelled`].
    pub fn async_callback<P>(proc: P) -> Self
    where
        P: Fn(&Connection, Callback<A, E>) + Send + Sync + 'static,
    {
        let proc = Arc::new(proc);
        Effect::from_run(move |parent| {
            let proc = Arc::clone(&proc);
            async move {
                let (connection, link) = parent.child();
                let (callback, outcome) = Callback::channel();

                proc(&connection, callback.clone());
                connection.push_hook(Box::new(move || {
                    if callback.fail(E::from(Cancelled)) {
                        tracing::debug!("bridged effect settled by cancellation");
                    }
                    future::ready(()).boxed()
                }));

                let result = match outcome.await {
                    Ok(result) => result,
                    Err(oneshot::Canceled) => {
                        tracing::debug!("bridged callback dropped without settling");
                        Err(E::from(Cancelled))
                    }
                };
                if let Some(link) = link {
                    parent.remove(link);
                }
                Settled::new(result)
            }
            .boxed()
        })
    }

    /// Lift a callback-based operation whose setup is itself an effect.
    ///
    /// Like [`async_callback`](Self::async_callback), but `proc` returns an
    /// effect that performs the setup. That effect runs fire-and-forget under
    /// the bridge's connection; if it fails, the failure settles the callback
    /// instead of escaping.
    pub fn async_callback_f<P>(proc: P) -> Self
    where
        P: Fn(&Connection, Callback<A, E>) -> Effect<(), E> + Send + Sync + 'static,
    {
        Effect::async_callback(move |connection, callback| {
            let setup = proc(connection, callback.clone());
            let connection = connection.clone();
            spawn_detached(
                async move {
                    if let Err(error) = setup.execute_with(&connection).await {
                        if !callback.fail(error) {
                            tracing::debug!("setup failed after the bridged effect settled");
                        }
                    }
                }
                .boxed(),
            );
        })
    }
}
