//! SQLite backend for the SSH upstream registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every logical step of a registration
//! runs in its own short-lived transaction.

mod schema;
mod store;
mod tx;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, TableCounts};
