//! Core trait for queue notification backends.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::QueueError;

/// Trait for queue notification backends.
///
/// A received `()` means "something may have become claimable"; it carries no
/// task identity. Receivers that lag should treat the lag itself as a wake.
#[async_trait]
pub trait QueueNotifier: Send + Sync + Clone + 'static {
    /// Subscribe to wake signals.
    fn subscribe(&self) -> broadcast::Receiver<()>;

    /// Run the background listener until `shutdown` fires.
    /// Call once per process. Emits one wake as soon as it is listening.
    async fn start(&self, shutdown: CancellationToken) -> Result<(), QueueError>;
}
