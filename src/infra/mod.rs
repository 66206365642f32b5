//! Infrastructure adapters for storage backends.

pub mod store;

pub use store::{InMemoryTaskStore, SqliteTaskStore, TaskStore};
