use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use taskq::{DrainOutcome, Engine, ListTasksParams, PgStore, PostgresNotifier};
use taskq_server::cli::{Cli, Command};
use taskq_server::config::Settings;
use taskq_server::telemetry::init_telemetry;
use taskq_server::{admin, register_builtin};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type PgEngine = Engine<PgStore, PostgresNotifier>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new().context("failed to load configuration")?;
    init_telemetry(&settings.telemetry)?;

    let store = PgStore::connect(
        &settings.database_url,
        settings.db_max_connections,
        settings.store_config(),
    )
    .await?;
    store.migrate().await?;

    let notifier = PostgresNotifier::new(
        store.pool().clone(),
        settings.queue.channel_capacity,
        settings.queue.max_reconnect_secs,
    );

    let mut builder = Engine::builder(store, notifier).config(settings.engine_config());
    register_builtin(&mut builder)?;
    let engine = builder.build();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(engine, &settings).await,
        Command::Drain => drain(&engine).await,
        Command::Enqueue { task_type, payload } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let id = engine.enqueue(&task_type, &payload).await?;
            println!("{id}");
            Ok(())
        }
        Command::List {
            filter,
            task_type,
            limit,
        } => {
            let mut params = ListTasksParams {
                filter: filter.into(),
                ..Default::default()
            }
            .with_limit(limit);
            if let Some(task_type) = task_type {
                params = params.with_task_type(task_type);
            }
            let tasks = engine.list(params).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            Ok(())
        }
        Command::ClearError { id } => {
            anyhow::ensure!(engine.clear_error(id).await?, "task {id} not found");
            info!(task_id = id, "Quarantined task released");
            Ok(())
        }
        Command::Delete { id } => {
            anyhow::ensure!(engine.delete(id).await?, "task {id} not found");
            info!(task_id = id, "Task deleted");
            Ok(())
        }
    }
}

async fn serve(engine: Arc<PgEngine>, settings: &Settings) -> anyhow::Result<()> {
    engine.store().health_check().await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let admin_handle = if settings.admin.enabled {
        let addr = format!("{}:{}", settings.admin.host, settings.admin.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind admin listener on {addr}"))?;
        info!(%addr, "Admin HTTP listening");

        let app = admin::router(engine.clone());
        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    } else {
        None
    };

    let result = engine.run(shutdown.clone()).await;
    // Dispatcher exit takes the admin surface down with it.
    shutdown.cancel();

    if let Some(handle) = admin_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Admin HTTP server exited with error"),
            Err(e) => warn!(error = %e, "Admin HTTP task panicked"),
        }
    }

    result?;
    info!("taskq-server stopped");
    Ok(())
}

async fn drain(engine: &PgEngine) -> anyhow::Result<()> {
    match engine.drain().await? {
        DrainOutcome::Drained(stats) => {
            info!(
                succeeded = stats.succeeded,
                quarantined = stats.quarantined,
                "Drain complete"
            );
        }
        DrainOutcome::AlreadyRunning => {
            warn!("A drain pass is already active in this process");
        }
    }
    Ok(())
}
