pub mod admin;
pub mod cli;
pub mod config;
pub mod telemetry;

use taskq::{EngineBuilder, EngineError, QueueNotifier, TaskRepository};
use tracing::debug;

/// Accepts any payload and succeeds. Useful for smoke-testing a deployment.
pub const NOOP_TASK_TYPE: &str = "noop";

/// Registers the handlers every server process ships with.
pub fn register_builtin<S: TaskRepository, N: QueueNotifier>(
    builder: &mut EngineBuilder<S, N>,
) -> Result<(), EngineError> {
    builder.register(NOOP_TASK_TYPE, |_tx, payload| {
        Box::pin(async move {
            debug!(%payload, "noop task");
            anyhow::Ok(())
        })
    })?;
    Ok(())
}
