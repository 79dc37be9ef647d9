use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ListTasksParams, Task, TaskFilter};

/// A transaction scoped to one claim/handle/settle cycle or to a caller's own
/// work. Dropping an unfinished unit of work rolls it back.
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;

    async fn savepoint(&mut self, name: &str) -> Result<(), StoreError>;

    /// Discards everything done since `savepoint(name)`; the savepoint stays usable.
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), StoreError>;
}

/// Storage seam for the task queue.
///
/// Rows are never flipped in place between pending and quarantined: settlement
/// deletes the claimed row (in [`claim_next`](Self::claim_next)) and optionally
/// inserts a quarantined copy (in [`quarantine`](Self::quarantine)) inside the
/// same unit of work.
#[async_trait]
pub trait TaskRepository: Send + Sync + 'static {
    type Tx: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Inserts a pending row in its own implicit transaction.
    async fn enqueue(&self, task_type: &str, payload: &serde_json::Value)
    -> Result<i64, StoreError>;

    /// Inserts a pending row that commits or rolls back with `tx`.
    async fn enqueue_in(
        &self,
        tx: &mut Self::Tx,
        task_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64, StoreError>;

    /// Locks and deletes the oldest pending row that no concurrent transaction
    /// holds. Rows locked elsewhere are skipped, never waited on.
    async fn claim_next(&self, tx: &mut Self::Tx) -> Result<Option<Task>, StoreError>;

    /// Inserts a quarantined copy of a claimed task carrying `error`.
    async fn quarantine(
        &self,
        tx: &mut Self::Tx,
        task_type: &str,
        payload: &serde_json::Value,
        error: &serde_json::Value,
    ) -> Result<i64, StoreError>;

    async fn list(&self, params: ListTasksParams) -> Result<Vec<Task>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Task>, StoreError>;

    async fn count(&self, filter: TaskFilter) -> Result<i64, StoreError>;

    /// Returns a quarantined row to the pending set. `false` when no row has `id`.
    async fn clear_error(&self, id: i64) -> Result<bool, StoreError>;

    /// `false` when no row has `id`.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}
