use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::traits::QueueNotifier;

/// Channel published by the `taskq.tasks` trigger whenever a row becomes pending.
pub const TASKS_CHANNEL: &str = "taskq_tasks";

#[derive(Clone)]
pub struct PostgresNotifier {
    pool: PgPool,
    sender: broadcast::Sender<()>,
    max_reconnect_secs: u64,
}

impl PostgresNotifier {
    pub fn new(pool: PgPool, channel_capacity: usize, max_reconnect_secs: u64) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            pool,
            sender,
            max_reconnect_secs,
        }
    }

    fn wake(&self) {
        // No subscribers is fine: nobody is idle-waiting right now.
        let _ = self.sender.send(());
    }

    async fn connect_listener(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(TASKS_CHANNEL).await?;
        Ok(listener)
    }

    /// Returns `None` when shutdown fires while waiting to retry.
    async fn reconnect_listener(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<PgListener>, QueueError> {
        let max_attempts = (self.max_reconnect_secs / 10).max(3) as usize;

        let mut backoff = backon::ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(max_attempts)
            .with_jitter()
            .build();

        loop {
            match self.connect_listener().await {
                Ok(listener) => {
                    info!(channel = TASKS_CHANNEL, "Queue listener reconnected");
                    return Ok(Some(listener));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to reconnect queue listener, retrying");
                    let Some(delay) = backoff.next() else {
                        error!(
                            "Exhausted reconnection attempts after {} seconds",
                            self.max_reconnect_secs
                        );
                        return Err(QueueError::ReconnectExhausted(self.max_reconnect_secs));
                    };

                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl QueueNotifier for PostgresNotifier {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), QueueError> {
        let mut listener = self.connect_listener().await?;

        info!(channel = TASKS_CHANNEL, "Queue listener started");
        // Inserts committed before LISTEN took effect were never delivered.
        self.wake();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Queue listener shutting down");
                    break;
                }

                result = listener.recv() => {
                    match result {
                        Ok(notification) => {
                            debug!(channel = notification.channel(), "Received pg_notify");
                            self.wake();
                        }
                        Err(e) => {
                            error!(error = %e, "Error receiving notification, attempting to reconnect");
                            match self.reconnect_listener(&shutdown).await? {
                                Some(reconnected) => {
                                    listener = reconnected;
                                    // Inserts committed while disconnected were never delivered.
                                    self.wake();
                                }
                                None => break,
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
