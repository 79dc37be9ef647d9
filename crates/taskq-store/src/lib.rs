//! # taskq-store
//!
//! Durable persistence for task rows. The [`TaskRepository`] trait is the only
//! storage seam the engine sees; [`PgStore`] backs it with Postgres and
//! [`MemoryStore`] with an in-process table that keeps the same transactional
//! and skip-locked claim semantics.

pub mod error;
pub mod memory;
pub mod models;
pub mod payload;
pub mod postgres;
pub mod repository;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTx};
pub use models::*;
pub use payload::StoreConfig;
pub use postgres::{PgStore, PgTx};
pub use repository::{TaskRepository, UnitOfWork};
