//! Demonstrates a cancellable background run with bracketed cleanup.
//!
//! Run with: cargo run --example cancellable_download

use std::time::Duration;

use undertow::{Effect, ExitCase, RetryPolicy};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Finishes normally: release sees Completed.
    let quick = download("small.bin", Duration::from_millis(50));
    match quick.execute().await {
        Ok(bytes) => tracing::info!(bytes, "download finished"),
        Err(e) => tracing::error!("download failed: {}", e),
    }

    // Disposed halfway: release sees Canceled and the callback never runs.
    let slow = download("huge.iso", Duration::from_secs(30));
    let disposable = slow
        .run_async_cancellable(|result| {
            Effect::invoke(move || {
                tracing::info!(?result, "background download settled");
                Ok(())
            })
        })
        .execute()
        .await
        .expect("starting a background run cannot fail");

    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!("user pressed cancel");
    disposable.dispose();
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Open a temporary file, fill it from a fake network stream, and always
/// remove it again.
fn download(name: &'static str, duration: Duration) -> Effect<usize, String> {
    let policy = RetryPolicy::exponential(Duration::from_millis(10)).with_max_retries(3);

    Effect::invoke(move || {
        tracing::info!(name, "opening temp file");
        Ok(name)
    })
    .bracket_case(
        move |name| fetch(name, duration).retry(policy),
        |name, exit: ExitCase<String>| {
            Effect::invoke(move || {
                tracing::info!(name, ?exit, "removing temp file");
                Ok(())
            })
        },
    )
    .instrument(tracing::info_span!("download", name))
}

/// A callback-style transfer that can be aborted through its connection.
fn fetch(name: &'static str, duration: Duration) -> Effect<usize, String> {
    Effect::async_callback(move |connection, callback| {
        let transfer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            callback.succeed(name.len() * 1024);
        });
        connection.push(Effect::<_, String>::invoke(move || {
            tracing::info!("aborting transfer");
            transfer.abort();
            Ok(())
        }));
    })
}
