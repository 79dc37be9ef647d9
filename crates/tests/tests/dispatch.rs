use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use taskq::{DrainOutcome, EngineError, TaskFilter, TaskRepository};
use taskq_tests::{TestHarness, wait_until};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore = "requires docker"]
async fn drain_runs_tasks_in_enqueue_order() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut builder = harness.builder();
    let sink = seen.clone();
    builder.register("echo", move |_tx, payload| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(payload["v"].as_str().unwrap_or_default().to_string());
            anyhow::Ok(())
        })
    })?;
    let engine = builder.build();

    for v in ["A", "B", "C"] {
        engine.enqueue("echo", &json!({ "v": v })).await?;
    }

    let outcome = engine.drain().await?;
    let DrainOutcome::Drained(stats) = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(stats.succeeded, 3);
    assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(harness.row_count().await, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_engines_deliver_each_task_once() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let deliveries: Arc<Mutex<HashMap<i64, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let make_engine = || -> anyhow::Result<_> {
        let mut builder = harness.builder();
        let sink = deliveries.clone();
        builder.register("count", move |_tx, payload: Value| {
            let sink = sink.clone();
            Box::pin(async move {
                let n = payload["n"].as_i64().unwrap_or(-1);
                *sink.lock().unwrap().entry(n).or_default() += 1;
                tokio::time::sleep(Duration::from_millis(2)).await;
                anyhow::Ok(())
            })
        })?;
        Ok(builder.build())
    };
    let first = make_engine()?;
    let second = make_engine()?;

    let total = 200;
    for n in 0..total {
        first.enqueue("count", &json!({ "n": n })).await?;
    }

    let (a, b) = tokio::join!(first.drain(), second.drain());
    let (DrainOutcome::Drained(a), DrainOutcome::Drained(b)) = (a?, b?) else {
        panic!("separate engines never report AlreadyRunning to each other");
    };
    assert_eq!(a.total() + b.total(), total as u64);

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), total as usize);
    assert!(deliveries.values().all(|count| *count == 1));
    assert_eq!(harness.row_count().await, 0);
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn unregistered_task_type_is_restored() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let engine = harness.engine();

    let id = engine.enqueue("mystery", &json!({})).await?;

    let err = engine.drain().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnregisteredTaskType { id: failed, ref task_type }
            if failed == id && task_type == "mystery"
    ));

    let task = harness.store.find_by_id(id).await?.expect("row restored");
    assert!(task.is_pending());
    assert!(!engine.is_running());
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn run_wakes_on_commit_notification() -> anyhow::Result<()> {
    let harness = TestHarness::new().await;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut builder = harness.builder();
    let sink = seen.clone();
    builder.register("echo", move |_tx, payload| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().unwrap().push(payload);
            anyhow::Ok(())
        })
    })?;
    let engine = builder.build();

    // Backlog from before the process started.
    engine.enqueue("echo", &json!({ "v": "backlog" })).await?;

    let shutdown = CancellationToken::new();
    let runner = engine.clone();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { runner.run(token).await });

    wait_until(Duration::from_secs(10), || {
        let seen = seen.clone();
        async move { seen.lock().unwrap().len() == 1 }
    })
    .await?;

    // Enqueued by another connection; only the trigger's NOTIFY can wake us.
    sqlx::query("INSERT INTO taskq.tasks (task_type, payload) VALUES ('echo', '{\"v\":\"live\"}')")
        .execute(&harness.pool)
        .await?;

    wait_until(Duration::from_secs(10), || {
        let seen = seen.clone();
        async move { seen.lock().unwrap().len() == 2 }
    })
    .await?;
    assert_eq!(seen.lock().unwrap()[1], json!({ "v": "live" }));
    assert_eq!(engine.count(TaskFilter::All).await?, 0);

    shutdown.cancel();
    handle.await??;
    Ok(())
}
