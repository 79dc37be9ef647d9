//! # taskq
//!
//! A durable, transactional task queue over a relational store.
//!
//! Collaborators register handlers for task-type names on an
//! [`EngineBuilder`], then schedule work with [`Engine::enqueue`] (or
//! [`Engine::enqueue_in`] to join their own transaction). Each process runs
//! [`Engine::run`], which drains the backlog at startup and again whenever the
//! store signals that a task became pending. Any number of processes may do so
//! against the same store; the store's skip-locked claim hands every task to
//! exactly one of them.
//!
//! ## Example
//!
//! ```no_run
//! use taskq::{Engine, EngineConfig};
//! use taskq_queue::LocalNotifier;
//! use taskq_store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = MemoryStore::default();
//! let mut builder = Engine::builder(store.clone(), LocalNotifier::new(&store));
//! builder.register("echo", |_tx, payload| {
//!     Box::pin(async move {
//!         tracing::info!(%payload, "echo");
//!         anyhow::Ok(())
//!     })
//! })?;
//! let engine = builder.config(EngineConfig::default()).build();
//!
//! engine.enqueue("echo", &serde_json::json!({"v": 1})).await?;
//! engine.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;

mod config;
mod dispatcher;
mod engine;
mod error;
mod failure;
mod registry;
mod trigger;

pub use config::EngineConfig;
pub use dispatcher::{DrainOutcome, DrainStats};
pub use engine::{Engine, EngineBuilder};
pub use error::EngineError;
pub use failure::HandlerFailure;
pub use registry::{HandlerFn, HandlerRegistry};

pub use taskq_queue::{LocalNotifier, PostgresNotifier, QueueNotifier};
pub use taskq_store::{
    ListTasksParams, MemoryStore, PgStore, StoreConfig, Task, TaskFilter, TaskRepository,
    UnitOfWork,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
