use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::json;
use taskq::{DrainOutcome, DrainStats, TaskFilter};
use taskq_tests::TestHarness;

#[tokio::test]
#[ignore = "requires docker"]
async fn failed_task_is_parked_until_cleared() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let failing = Arc::new(AtomicBool::new(true));
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut builder = harness.builder();
    let fail = failing.clone();
    let calls = attempts.clone();
    builder.register("boom", move |_tx, _payload| {
        let fail = fail.clone();
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("oops"));
            }
            anyhow::Ok(())
        })
    })?;
    let engine = builder.build();

    engine.enqueue("boom", &json!({ "x": 1 })).await?;

    let outcome = engine.drain().await?;
    assert_eq!(
        outcome,
        DrainOutcome::Drained(DrainStats {
            succeeded: 0,
            quarantined: 1,
        })
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // Parked rows are invisible to later passes.
    engine.drain().await?;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let parked = engine.list(taskq::ListTasksParams::quarantined()).await?;
    assert_eq!(parked.len(), 1);
    let task = &parked[0];
    assert_eq!(task.payload, json!({ "x": 1 }));
    let error = task.error.as_ref().expect("error detail");
    assert!(error["message"].as_str().unwrap().contains("oops"));
    assert!(error["failed_at"].is_string());

    failing.store(false, Ordering::SeqCst);
    assert!(engine.clear_error(task.id).await?);
    assert_eq!(engine.count(TaskFilter::Pending).await?, 1);

    engine.drain().await?;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(harness.row_count().await, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn admin_operations_on_missing_rows() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let engine = harness.engine();

    assert!(!engine.clear_error(999).await?);
    assert!(!engine.delete(999).await?);
    assert!(engine.find(999).await?.is_none());

    let id = engine.enqueue("noop", &json!({})).await?;
    assert!(engine.delete(id).await?);
    assert_eq!(harness.row_count().await, 0);
    Ok(())
}
