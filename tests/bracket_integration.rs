//! Integration tests for bracket resource management with tokio file I/O.
//!
//! These tests verify that releases run exactly once for every way the use
//! stage can end: success, failure, cancellation, and timeout.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use undertow::testing::Probe;
use undertow::{assert_fails, assert_succeeds};
use undertow::{BracketError, Cancelled, Connection, Effect, ExitCase, TimeoutError};

/// Cloneable file-system failure, so releases can observe it.
#[derive(Debug, Clone, PartialEq)]
struct FsError {
    kind: io::ErrorKind,
    message: String,
}

impl FsError {
    fn other(message: &str) -> Self {
        FsError {
            kind: io::ErrorKind::Other,
            message: message.to_string(),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(error: io::Error) -> Self {
        FsError {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<Cancelled> for FsError {
    fn from(cancelled: Cancelled) -> Self {
        io::Error::from(cancelled).into()
    }
}

// ============================================================================
// File I/O
// ============================================================================

fn temp_file_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("undertow_bracket_test_{}.txt", name))
}

fn create_file(path: PathBuf) -> Effect<PathBuf, FsError> {
    Effect::from_future(move || {
        let path = path.clone();
        async move {
            tokio::fs::write(&path, "test content").await?;
            Ok::<_, FsError>(path)
        }
    })
}

fn remove_file(path: PathBuf) -> Effect<(), FsError> {
    Effect::from_future(move || {
        let path = path.clone();
        async move { tokio::fs::remove_file(&path).await.map_err(FsError::from) }
    })
}

#[tokio::test]
async fn bracket_cleans_up_temp_file_on_success() {
    let path = temp_file_path("success");
    let probe = Probe::new();
    let recorder = probe.clone();

    let effect = create_file(path.clone()).bracket(
        |p| {
            Effect::from_future(move || {
                let p = p.clone();
                async move { tokio::fs::read_to_string(&p).await.map_err(FsError::from) }
            })
        },
        move |p| {
            recorder.record("cleanup");
            remove_file(p)
        },
    );

    assert_succeeds!(effect.execute().await, "test content".to_string());
    assert_eq!(probe.count("cleanup"), 1);
    assert!(!path.exists(), "temp file should be deleted");
}

#[tokio::test]
async fn bracket_cleans_up_temp_file_on_use_failure() {
    let path = temp_file_path("use_failure");

    let effect = create_file(path.clone()).bracket(
        |_| Effect::<String, _>::raise_error(FsError::other("parse failed")),
        remove_file,
    );

    assert_fails!(effect.execute().await, FsError::other("parse failed"));
    assert!(!path.exists(), "temp file should be deleted");
}

#[tokio::test]
async fn bracket_skips_release_when_acquire_fails() {
    let probe = Probe::new();
    let missing = std::env::temp_dir()
        .join("undertow_missing_dir")
        .join("nested")
        .join("file.txt");

    let effect = create_file(missing).bracket(|p| Effect::just(p), {
        let probe = probe.clone();
        move |_| probe.effect("cleanup")
    });

    let error = assert_fails!(effect.execute().await);
    assert_eq!(error.kind, io::ErrorKind::NotFound);
    assert!(probe.events().is_empty());
}

#[tokio::test]
async fn bracket_full_separates_cleanup_failure() {
    let path = temp_file_path("cleanup_failure");

    let effect = create_file(path.clone()).bracket_full(
        |p| Effect::just(p),
        |p, _| {
            Effect::from_future(move || {
                let p = p.clone();
                async move {
                    tokio::fs::remove_file(&p).await?;
                    Err::<(), _>(FsError::other("audit log unavailable"))
                }
            })
        },
    );

    match effect.execute().await {
        Err(BracketError::CleanupError(e)) => assert_eq!(e.message, "audit log unavailable"),
        other => panic!("expected cleanup error, got {:?}", other),
    }
    assert!(!path.exists());
}

// ============================================================================
// Cancellation
// ============================================================================

/// A use stage that never settles on its own and reports when it started.
fn never_settles(started: tokio::sync::mpsc::UnboundedSender<()>) -> Effect<(), FsError> {
    Effect::async_callback(move |_, _callback| {
        let _ = started.send(());
    })
}

#[tokio::test]
async fn cancelling_mid_use_releases_with_canceled_once() {
    let probe = Probe::new();
    let connection = Connection::new();
    let (started_tx, mut started) = tokio::sync::mpsc::unbounded_channel();

    let effect = Effect::<_, FsError>::just("socket")
        .bracket_case(move |_| never_settles(started_tx.clone()), probe.release("socket"));

    let running = {
        let connection = connection.clone();
        tokio::spawn(async move { effect.execute_with(&connection).await })
    };
    started.recv().await.unwrap();

    connection.cancel::<FsError>().execute().await.unwrap();
    connection.cancel::<FsError>().execute().await.unwrap();

    let error = assert_fails!(running.await.unwrap());
    assert_eq!(error.kind, io::ErrorKind::Interrupted);
    assert_eq!(probe.events(), vec!["socket:canceled"]);
}

#[tokio::test]
async fn timeout_releases_with_canceled() {
    let probe = Probe::new();
    let (started_tx, _started) = tokio::sync::mpsc::unbounded_channel();

    let effect = Effect::<_, FsError>::just("lock")
        .bracket_case(move |_| never_settles(started_tx.clone()), probe.release("lock"))
        .timeout(Duration::from_millis(20));

    match effect.execute().await {
        Err(TimeoutError::Timeout { duration }) => {
            assert_eq!(duration, Duration::from_millis(20))
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(probe.events(), vec!["lock:canceled"]);
}

/// A release that takes a while and records when it starts and finishes.
fn slow_release(
    probe: Probe,
    label: &'static str,
) -> impl Fn(i32, ExitCase<String>) -> Effect<(), String> + Send + Sync + 'static {
    move |_, _| {
        let probe = probe.clone();
        Effect::from_future(move || {
            let probe = probe.clone();
            async move {
                probe.record(format!("{}:started", label));
                tokio::time::sleep(Duration::from_millis(50)).await;
                probe.record(format!("{}:finished", label));
                Ok(())
            }
        })
    }
}

#[tokio::test]
async fn timeout_during_release_lets_it_finish() {
    let probe = Probe::new();
    let effect = Effect::<_, String>::just(1)
        .bracket_case(|x| Effect::just(x), slow_release(probe.clone(), "pool"))
        .timeout(Duration::from_millis(10));

    match effect.execute().await {
        Err(TimeoutError::Timeout { duration }) => {
            assert_eq!(duration, Duration::from_millis(10))
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(probe.events(), vec!["pool:started", "pool:finished"]);
}

#[tokio::test]
async fn cancelling_nested_brackets_releases_inner_first() {
    let probe = Probe::new();
    let inner_probe = probe.clone();
    let connection = Connection::new();
    let (started_tx, mut started) = tokio::sync::mpsc::unbounded_channel();

    let effect = Effect::<_, FsError>::just("table").bracket_case(
        move |_| {
            let started_tx = started_tx.clone();
            Effect::just("row").bracket_case(
                move |_| never_settles(started_tx.clone()),
                inner_probe.release("row"),
            )
        },
        probe.release("table"),
    );

    let running = {
        let connection = connection.clone();
        tokio::spawn(async move { effect.execute_with(&connection).await })
    };
    started.recv().await.unwrap();
    connection.cancel::<FsError>().execute().await.unwrap();

    let error = assert_fails!(running.await.unwrap());
    assert_eq!(error.kind, io::ErrorKind::Interrupted);
    assert_eq!(probe.events(), vec!["row:canceled", "table:canceled"]);
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn nested_brackets_release_inner_first() {
    let probe = Probe::new();
    let inner_probe = probe.clone();

    let effect = Effect::<_, String>::just("outer").bracket_case(
        move |_| {
            Effect::just("inner").bracket_case(|_| Effect::just(42), inner_probe.release("inner"))
        },
        probe.release("outer"),
    );

    assert_succeeds!(effect.execute().await, 42);
    assert_eq!(probe.events(), vec!["inner:completed", "outer:completed"]);
}

#[tokio::test]
async fn inner_failure_reaches_both_releases() {
    let probe = Probe::new();
    let inner_probe = probe.clone();

    let effect = Effect::<_, String>::just("outer").bracket_case(
        move |_| {
            Effect::just("inner").bracket_case(
                |_| Effect::<i32, _>::raise_error("query failed".to_string()),
                inner_probe.release("inner"),
            )
        },
        probe.release("outer"),
    );

    assert_fails!(effect.execute().await, "query failed".to_string());
    assert_eq!(probe.events(), vec!["inner:error", "outer:error"]);
}

#[tokio::test]
async fn concurrent_executions_release_independently() {
    let probe = Probe::new();
    let effect =
        Effect::<_, String>::just(1).bracket_case(|x| Effect::just(x + 1), probe.release("r"));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let effect = effect.clone();
            tokio::spawn(async move { effect.execute().await })
        })
        .collect();
    for handle in handles {
        assert_succeeds!(handle.await.unwrap(), 2);
    }

    assert_eq!(probe.count("r:completed"), 10);
}

#[tokio::test]
async fn guarantee_case_sees_cancellation() {
    let connection = Connection::new();
    let (exit_tx, mut exits) = tokio::sync::mpsc::unbounded_channel();
    let (started_tx, mut started) = tokio::sync::mpsc::unbounded_channel();

    let effect = never_settles(started_tx).guarantee_case(move |exit| {
        let _ = exit_tx.send(exit.is_canceled());
        Effect::just(())
    });

    let running = {
        let connection = connection.clone();
        tokio::spawn(async move { effect.execute_with(&connection).await })
    };
    started.recv().await.unwrap();
    connection.cancel::<FsError>().execute().await.unwrap();

    assert!(running.await.unwrap().is_err());
    assert_eq!(exits.recv().await, Some(true));
}

#[test]
fn exit_case_matches_use_outcome() {
    let exits: Vec<ExitCase<&str>> =
        vec![ExitCase::Completed, ExitCase::Error("e"), ExitCase::Canceled];
    assert_eq!(exits.iter().filter(|e| e.is_canceled()).count(), 1);
    assert_eq!(exits[1].error(), Some(&"e"));
}
