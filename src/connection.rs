//! Per-execution cancellation tokens.
//!
//! A [`Connection`] is the cancellable lifecycle of one in-flight execution. It
//! holds the cleanup actions registered while the execution runs and a
//! cancelled flag that flips exactly once.
//!
//! - Hooks pushed before cancellation are queued and run in registration order
//!   when [`Connection::cancel`] runs.
//! - Hooks pushed after cancellation run immediately, detached from the caller.
//! - Cancelling again is a no-op.
//!
//! # Example
//!
//! ```rust
//! use undertow::{Connection, Effect};
//!
//! # tokio_test::block_on(async {
//! let connection = Connection::new();
//! connection.push(Effect::<_, String>::invoke(|| {
//!     println!("cleaning up");
//!     Ok(())
//! }));
//! assert_eq!(connection.pending(), 1);
//!
//! connection.cancel::<String>().execute().await.unwrap();
//! assert!(connection.is_cancelled());
//! assert_eq!(connection.pending(), 0);
//! # });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::context::spawn_detached;
use crate::effect::Effect;
use crate::error::Failure;

/// A type-erased cancellation action.
///
/// Calling the closure performs any synchronous part of the cancellation; the
/// returned future performs the rest.
pub(crate) type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Identifies a hook so it can be withdrawn once its guarded work settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HookKey(u64);

/// Cancellation token for one execution.
///
/// Cloning produces another handle to the same token.
#[derive(Clone, Default)]
pub struct Connection {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    hooks: Mutex<Hooks>,
}

#[derive(Default)]
struct Hooks {
    next_key: u64,
    pending: Vec<(HookKey, Hook)>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("cancelled", &self.is_cancelled())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Connection {
    /// Create a live, uncancelled connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Number of hooks waiting for cancellation.
    pub fn pending(&self) -> usize {
        self.inner.hooks.lock().pending.len()
    }

    /// Register `cancel_action` to run when this connection is cancelled.
    ///
    /// If the connection is already cancelled the action runs immediately,
    /// detached from the caller. Failures of the action are logged, since no
    /// consumer is left to observe them.
    pub fn push<E: Failure>(&self, cancel_action: Effect<(), E>) {
        self.push_hook(hook_from_effect(cancel_action));
    }

    /// Returns a deferred action that cancels this connection.
    ///
    /// Running it flips the cancelled flag and runs every pending hook in
    /// registration order, completing once they all have. Only the first run
    /// does any work; later runs, and concurrent ones, complete immediately.
    pub fn cancel<E: Failure>(&self) -> Effect<(), E> {
        let connection = self.clone();
        Effect::from_future(move || connection.cancel_now().map(Ok))
    }

    /// Flip the cancelled flag now and return the future running the hooks.
    pub(crate) fn cancel_now(&self) -> BoxFuture<'static, ()> {
        let hooks = {
            let mut hooks = self.inner.hooks.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return future::ready(()).boxed();
            }
            std::mem::take(&mut hooks.pending)
        };
        tracing::debug!(hooks = hooks.len(), "connection cancelled");

        async move {
            for (HookKey(key), hook) in hooks {
                tracing::trace!(key, "running cancellation hook");
                hook().await;
            }
        }
        .boxed()
    }

    /// Register a hook, returning its key while it stays queued.
    ///
    /// Returns `None` when the connection was already cancelled and the hook
    /// has been started instead.
    pub(crate) fn push_hook(&self, hook: Hook) -> Option<HookKey> {
        let mut hooks = self.inner.hooks.lock();
        if self.is_cancelled() {
            drop(hooks);
            tracing::trace!("connection already cancelled, running hook now");
            spawn_detached(hook());
            return None;
        }
        let key = HookKey(hooks.next_key);
        hooks.next_key += 1;
        hooks.pending.push((key, hook));
        Some(key)
    }

    /// Withdraw a queued hook without running it.
    ///
    /// Returns `false` if cancellation already took it.
    pub(crate) fn remove(&self, key: HookKey) -> bool {
        let mut hooks = self.inner.hooks.lock();
        match hooks.pending.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                hooks.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Create a connection that is cancelled whenever this one is.
    ///
    /// The returned key withdraws the link once the child's work settles.
    pub(crate) fn child(&self) -> (Connection, Option<HookKey>) {
        let child = Connection::new();
        let linked = child.clone();
        let key = self.push_hook(Box::new(move || linked.cancel_now()));
        (child, key)
    }
}

fn hook_from_effect<E: Failure>(action: Effect<(), E>) -> Hook {
    Box::new(move || {
        async move {
            if let Err(error) = action.execute().await {
                tracing::warn!(?error, "cancellation hook failed");
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Probe;

    #[tokio::test]
    async fn cancel_runs_hooks_in_registration_order() {
        let probe = Probe::new();
        let connection = Connection::new();
        connection.push(probe.effect::<String>("first"));
        connection.push(probe.effect::<String>("second"));
        connection.push(probe.effect::<String>("third"));

        connection.cancel::<String>().execute().await.unwrap();

        assert_eq!(probe.events(), vec!["first", "second", "third"]);
        assert_eq!(connection.pending(), 0);
    }

    #[tokio::test]
    async fn cancelling_twice_runs_hooks_once() {
        let probe = Probe::new();
        let connection = Connection::new();
        connection.push(probe.effect::<String>("hook"));

        let cancel = connection.cancel::<String>();
        cancel.execute().await.unwrap();
        cancel.execute().await.unwrap();
        connection.cancel::<String>().execute().await.unwrap();

        assert_eq!(probe.count("hook"), 1);
    }

    #[tokio::test]
    async fn push_after_cancel_runs_immediately() {
        let connection = Connection::new();
        connection.cancel::<String>().execute().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        connection.push(Effect::<_, String>::invoke(move || {
            let _ = tx.send("late");
            Ok(())
        }));

        assert_eq!(rx.recv().await, Some("late"));
        assert_eq!(connection.pending(), 0);
    }

    #[tokio::test]
    async fn cancel_is_deferred_until_run() {
        let connection = Connection::new();
        let cancel = connection.cancel::<String>();
        assert!(!connection.is_cancelled());

        cancel.execute().await.unwrap();
        assert!(connection.is_cancelled());
    }

    #[tokio::test]
    async fn failing_hook_does_not_stop_the_others() {
        let probe = Probe::new();
        let connection = Connection::new();
        connection.push(Effect::<(), String>::raise_error("hook failed".to_string()));
        connection.push(probe.effect::<String>("after"));

        assert_eq!(connection.cancel::<String>().execute().await, Ok(()));
        assert_eq!(probe.events(), vec!["after"]);
    }

    #[tokio::test]
    async fn concurrent_cancels_run_hooks_once() {
        let probe = Probe::new();
        let connection = Connection::new();
        for _ in 0..8 {
            connection.push(probe.effect::<String>("hook"));
        }

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cancel = connection.cancel::<String>();
                tokio::spawn(async move { cancel.execute().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(probe.count("hook"), 8);
    }

    #[test]
    fn removed_hook_never_runs() {
        let probe = Probe::new();
        let connection = Connection::new();
        let recorder = probe.clone();
        let key = connection
            .push_hook(Box::new(move || {
                recorder.record("removed");
                future::ready(()).boxed()
            }))
            .unwrap();

        assert!(connection.remove(key));
        assert!(!connection.remove(key));
        futures::executor::block_on(connection.cancel_now());
        assert!(probe.events().is_empty());
    }

    #[test]
    fn child_is_cancelled_with_parent() {
        let parent = Connection::new();
        let (child, key) = parent.child();
        assert!(key.is_some());

        futures::executor::block_on(parent.cancel_now());
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_of_cancelled_parent_starts_cancelled() {
        let parent = Connection::new();
        futures::executor::block_on(parent.cancel_now());

        let (child, key) = parent.child();
        assert!(key.is_none());
        assert!(child.is_cancelled());
    }
}
