use taskq_queue::QueueError;
use taskq_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A claimed task names a type with no registered handler. The claim was
    /// rolled back, so the task is pending again.
    #[error("no handler registered for task_type={task_type} (task {id})")]
    UnregisteredTaskType { id: i64, task_type: String },

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
