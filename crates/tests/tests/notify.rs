use std::time::Duration;

use taskq_queue::QueueNotifier;
use taskq_tests::TestHarness;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires docker"]
async fn listener_wakes_once_listening() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let notifier = harness.notifier();
    let mut wakes = notifier.subscribe();

    let shutdown = CancellationToken::new();
    let listener = notifier.clone();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { listener.start(token).await });

    // No insert happens: the wake covers anything committed before LISTEN.
    tokio::time::timeout(Duration::from_secs(10), wakes.recv()).await??;

    sqlx::query("INSERT INTO taskq.tasks (task_type, payload) VALUES ('noop', '{}')")
        .execute(&harness.pool)
        .await?;
    tokio::time::timeout(Duration::from_secs(10), wakes.recv()).await??;

    shutdown.cancel();
    handle.await??;
    Ok(())
}
