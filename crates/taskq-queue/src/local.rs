use async_trait::async_trait;
use taskq_store::MemoryStore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::traits::QueueNotifier;

/// Forwards [`MemoryStore`] change signals. There is no connection to keep
/// alive, so `start` only waits for shutdown.
#[derive(Clone)]
pub struct LocalNotifier {
    store: MemoryStore,
}

impl LocalNotifier {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            store: store.clone(),
        }
    }
}

#[async_trait]
impl QueueNotifier for LocalNotifier {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.store.subscribe()
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), QueueError> {
        shutdown.cancelled().await;
        Ok(())
    }
}
