mod task;

pub use task::{TaskRepository, UnitOfWork};
