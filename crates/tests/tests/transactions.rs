use std::time::Duration;

use serde_json::json;
use sqlx::postgres::PgListener;
use taskq::{DrainOutcome, DrainStats, TaskFilter, TaskRepository, UnitOfWork};
use taskq_queue::TASKS_CHANNEL;
use taskq_tests::TestHarness;

#[tokio::test]
#[ignore = "requires docker"]
async fn rolled_back_enqueue_leaves_no_trace() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let engine = harness.engine();

    let mut listener = PgListener::connect_with(&harness.pool).await?;
    listener.listen(TASKS_CHANNEL).await?;

    let mut tx = harness.store.begin().await?;
    engine.enqueue_in(&mut tx, "echo", &json!({ "v": 1 })).await?;
    tx.rollback().await?;

    assert_eq!(harness.row_count().await, 0);
    assert!(
        tokio::time::timeout(Duration::from_millis(500), listener.recv())
            .await
            .is_err(),
        "rolled back insert must not notify"
    );

    let mut tx = harness.store.begin().await?;
    engine.enqueue_in(&mut tx, "echo", &json!({ "v": 2 })).await?;
    tx.commit().await?;

    let notification = tokio::time::timeout(Duration::from_secs(5), listener.recv()).await??;
    assert_eq!(notification.channel(), TASKS_CHANNEL);
    assert_eq!(engine.count(TaskFilter::Pending).await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn handler_writes_follow_the_outcome() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;

    let mut builder = harness.builder();
    builder.register("write", |tx, payload| {
        Box::pin(async move {
            let label = payload["label"].as_str().unwrap_or_default().to_string();
            sqlx::query("INSERT INTO effects (label) VALUES ($1)")
                .bind(&label)
                .execute(&mut **tx)
                .await?;
            if payload["fail"].as_bool().unwrap_or(false) {
                anyhow::bail!("refusing {label}");
            }
            anyhow::Ok(())
        })
    })?;
    let engine = builder.build();

    engine
        .enqueue("write", &json!({ "label": "kept", "fail": false }))
        .await?;
    engine
        .enqueue("write", &json!({ "label": "discarded", "fail": true }))
        .await?;

    let outcome = engine.drain().await?;
    assert_eq!(
        outcome,
        DrainOutcome::Drained(DrainStats {
            succeeded: 1,
            quarantined: 1,
        })
    );

    assert_eq!(harness.effects().await, vec!["kept"]);

    let parked = engine.list(taskq::ListTasksParams::quarantined()).await?;
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].payload["label"], "discarded");
    let error = parked[0].error.as_ref().expect("error detail");
    assert!(error["message"].as_str().unwrap().contains("refusing discarded"));
    Ok(())
}
