//! Wake notifications for taskq.
//!
//! Provides a `QueueNotifier` trait that turns store-side change signals into
//! a content-free local broadcast, with a PostgreSQL implementation built on
//! LISTEN/NOTIFY and an in-process one for [`taskq_store::MemoryStore`].

mod error;
mod local;
mod postgres;
mod traits;

pub use error::QueueError;
pub use local::LocalNotifier;
pub use postgres::{PostgresNotifier, TASKS_CHANNEL};
pub use traits::QueueNotifier;
