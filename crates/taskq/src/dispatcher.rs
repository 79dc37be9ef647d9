//! Claim, handle, settle.
//!
//! Every iteration owns exactly one unit of work and finalizes it (commit or
//! rollback) before the next claim, so no transaction outlives its task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use taskq_queue::QueueNotifier;
use taskq_store::{Task, TaskRepository, UnitOfWork};
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::failure::HandlerFailure;
use crate::registry::HandlerFn;

/// Handler writes are discarded back to here on failure, keeping the claim.
const HANDLER_SAVEPOINT: &str = "taskq_handler";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub succeeded: u64,
    pub quarantined: u64,
}

impl DrainStats {
    pub fn total(&self) -> u64 {
        self.succeeded + self.quarantined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained(DrainStats),
    /// Another pass was already active in this process; it will loop once
    /// more before going idle.
    AlreadyRunning,
}

enum Settlement {
    Completed,
    Quarantined,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: TaskRepository, N: QueueNotifier> Engine<S, N> {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Processes pending tasks one at a time until none can be claimed.
    ///
    /// Handler failures are quarantined and the pass continues. An unregistered
    /// task type or a storage failure rolls back the current claim and ends the
    /// pass with an error.
    pub async fn drain(&self) -> Result<DrainOutcome, EngineError> {
        // Announce before trying the flag, so a pass that is finishing sees it.
        self.rerun.store(true, Ordering::SeqCst);

        let mut stats = DrainStats::default();
        let mut passes = 0u32;
        loop {
            let Some(guard) = RunningGuard::acquire(&self.running) else {
                if passes > 0 {
                    // Another drain took the flag between our release and
                    // rerun check; it owns the rerun now.
                    break;
                }
                debug!("Dispatcher already running in this process");
                return Ok(DrainOutcome::AlreadyRunning);
            };
            passes += 1;
            self.rerun.store(false, Ordering::SeqCst);

            while let Some(settlement) = self.process_next().await? {
                match settlement {
                    Settlement::Completed => stats.succeeded += 1,
                    Settlement::Quarantined => stats.quarantined += 1,
                }
            }

            drop(guard);
            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
        }

        if stats.total() > 0 {
            info!(
                succeeded = stats.succeeded,
                quarantined = stats.quarantined,
                "Dispatcher idle"
            );
        }

        Ok(DrainOutcome::Drained(stats))
    }

    async fn process_next(&self) -> Result<Option<Settlement>, EngineError> {
        let mut tx = self.store.begin().await?;

        let Some(task) = self.store.claim_next(&mut tx).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let Some(handler) = self.registry.get(&task.task_type) else {
            if let Err(e) = tx.rollback().await {
                warn!(task_id = task.id, error = %e, "Rollback after unregistered task type failed");
            }
            error!(
                task_id = task.id,
                task_type = %task.task_type,
                "No handler registered for task type, task left pending"
            );
            return Err(EngineError::UnregisteredTaskType {
                id: task.id,
                task_type: task.task_type,
            });
        };

        debug!(task_id = task.id, task_type = %task.task_type, "Task claimed");

        tx.savepoint(HANDLER_SAVEPOINT).await?;
        match self.invoke(&handler, &mut tx, &task).await {
            Ok(()) => {
                tx.commit().await?;
                debug!(task_id = task.id, task_type = %task.task_type, "Task completed");
                Ok(Some(Settlement::Completed))
            }
            Err(failure) => {
                tx.rollback_to_savepoint(HANDLER_SAVEPOINT).await?;
                let detail = failure.to_detail();
                let parked_id = self
                    .store
                    .quarantine(&mut tx, &task.task_type, &task.payload, &detail)
                    .await?;
                tx.commit().await?;

                warn!(
                    task_id = task.id,
                    quarantined_id = parked_id,
                    task_type = %task.task_type,
                    error = %failure,
                    "Task failed and was quarantined"
                );
                Ok(Some(Settlement::Quarantined))
            }
        }
    }

    async fn invoke(
        &self,
        handler: &Arc<HandlerFn<S::Tx>>,
        tx: &mut S::Tx,
        task: &Task,
    ) -> Result<(), HandlerFailure> {
        let call = handler(tx, task.payload.clone());
        match self.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(HandlerFailure::Failed),
                Err(_) => Err(HandlerFailure::TimedOut(limit)),
            },
            None => call.await.map_err(HandlerFailure::Failed),
        }
    }
}
