use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use taskq_queue::QueueNotifier;
use taskq_store::{ListTasksParams, Task, TaskFilter, TaskRepository};
use tracing::{debug, info, instrument};

use crate::BoxFuture;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::HandlerRegistry;

/// Collects handlers before the engine exists. Once [`build`](Self::build)
/// runs the registry is frozen, so every registration precedes the startup
/// drain.
pub struct EngineBuilder<S: TaskRepository, N: QueueNotifier> {
    store: S,
    notifier: N,
    registry: HandlerRegistry<S::Tx>,
    config: EngineConfig,
}

impl<S: TaskRepository, N: QueueNotifier> EngineBuilder<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            registry: HandlerRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = Some(timeout);
        self
    }

    pub fn register<F>(&mut self, task_type: &str, handler: F) -> Result<&mut Self, EngineError>
    where
        F: for<'t> Fn(&'t mut S::Tx, serde_json::Value) -> BoxFuture<'t, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(task_type, handler)?;
        Ok(self)
    }

    pub fn register_typed<P, F>(
        &mut self,
        task_type: &str,
        handler: F,
    ) -> Result<&mut Self, EngineError>
    where
        P: DeserializeOwned + Send + 'static,
        F: for<'t> Fn(&'t mut S::Tx, P) -> BoxFuture<'t, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register_typed(task_type, handler)?;
        Ok(self)
    }

    pub fn build(self) -> Arc<Engine<S, N>> {
        info!(
            task_types = ?self.registry.task_types(),
            handler_timeout = ?self.config.handler_timeout,
            "Task engine built"
        );

        Arc::new(Engine {
            store: self.store,
            notifier: self.notifier,
            registry: self.registry,
            config: self.config,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        })
    }
}

/// One per process. Shared by reference between task producers and the
/// process bootstrap that drives [`Engine::run`].
pub struct Engine<S: TaskRepository, N: QueueNotifier> {
    pub(crate) store: S,
    pub(crate) notifier: N,
    pub(crate) registry: HandlerRegistry<S::Tx>,
    pub(crate) config: EngineConfig,
    pub(crate) running: AtomicBool,
    pub(crate) rerun: AtomicBool,
}

impl<S: TaskRepository, N: QueueNotifier> Engine<S, N> {
    pub fn builder(store: S, notifier: N) -> EngineBuilder<S, N> {
        EngineBuilder::new(store, notifier)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &HandlerRegistry<S::Tx> {
        &self.registry
    }

    /// Schedules a task in its own transaction. The type is not checked
    /// against the registry; another process may be the one handling it.
    #[instrument(skip(self, payload))]
    pub async fn enqueue<P>(&self, task_type: &str, payload: &P) -> Result<i64, EngineError>
    where
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        let id = self.store.enqueue(task_type, &payload).await?;
        debug!(task_id = id, "Task enqueued");
        Ok(id)
    }

    /// Schedules a task inside the caller's unit of work: it becomes visible
    /// (and wakes dispatchers) only if `tx` commits.
    #[instrument(skip(self, tx, payload))]
    pub async fn enqueue_in<P>(
        &self,
        tx: &mut S::Tx,
        task_type: &str,
        payload: &P,
    ) -> Result<i64, EngineError>
    where
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        let id = self.store.enqueue_in(tx, task_type, &payload).await?;
        debug!(task_id = id, "Task enqueued in caller transaction");
        Ok(id)
    }

    pub async fn list(&self, params: ListTasksParams) -> Result<Vec<Task>, EngineError> {
        Ok(self.store.list(params).await?)
    }

    pub async fn find(&self, id: i64) -> Result<Option<Task>, EngineError> {
        Ok(self.store.find_by_id(id).await?)
    }

    pub async fn count(&self, filter: TaskFilter) -> Result<i64, EngineError> {
        Ok(self.store.count(filter).await?)
    }

    /// Returns a quarantined task to the pending set.
    #[instrument(skip(self))]
    pub async fn clear_error(&self, id: i64) -> Result<bool, EngineError> {
        let cleared = self.store.clear_error(id).await?;
        if cleared {
            info!(task_id = id, "Task error cleared, task is pending again");
        }
        Ok(cleared)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool, EngineError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(task_id = id, "Task deleted");
        }
        Ok(deleted)
    }
}
