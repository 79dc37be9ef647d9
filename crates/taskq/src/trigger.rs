use taskq_queue::{QueueError, QueueNotifier};
use taskq_store::TaskRepository;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::DrainOutcome;
use crate::engine::Engine;
use crate::error::EngineError;

impl<S: TaskRepository, N: QueueNotifier> Engine<S, N> {
    /// Long-lived wake trigger.
    ///
    /// Starts the notification listener, drains whatever backlog accumulated
    /// while the process was down, then drains again after every wake signal
    /// until `shutdown` fires. A failed pass is logged and the trigger keeps
    /// listening; the task that caused it is still pending and will be retried
    /// on the next wake.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        // Subscribe before spawning the listener: it wakes once it is listening,
        // covering inserts that landed between the startup pass and LISTEN.
        let mut wakes = self.notifier.subscribe();

        let listener_token = shutdown.child_token();
        let notifier = self.notifier.clone();
        let token = listener_token.clone();
        let mut listener = tokio::spawn(async move { notifier.start(token).await });

        info!(task_types = ?self.registry.task_types(), "Dispatcher started");
        self.drain_logged("startup").await;

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Dispatcher shutting down");
                    break Ok(());
                }

                joined = &mut listener => {
                    break match joined {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => {
                            error!(error = %e, "Queue listener stopped");
                            Err(e.into())
                        }
                        Err(e) => Err(QueueError::Other(format!("listener task failed: {e}")).into()),
                    };
                }

                received = wakes.recv() => match received {
                    Ok(()) => self.drain_logged("notification").await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Wake receiver lagged");
                        self.drain_logged("notification").await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Wake channel closed");
                        break Err(QueueError::Other("wake channel closed".to_string()).into());
                    }
                },
            }
        };

        listener_token.cancel();
        result
    }

    async fn drain_logged(&self, reason: &'static str) {
        match self.drain().await {
            Ok(DrainOutcome::Drained(stats)) => {
                debug!(reason, processed = stats.total(), "Dispatch pass finished");
            }
            Ok(DrainOutcome::AlreadyRunning) => {
                debug!(reason, "Dispatch pass deferred to the running loop");
            }
            Err(e) => {
                error!(reason, error = %e, "Dispatch pass aborted");
            }
        }
    }
}
