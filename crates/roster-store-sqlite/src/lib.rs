//! SQLite backend for the Roster enrollment status history.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Transactions are serialised through an
//! async gate, so at most one unit of work observes and mutates a timeline at
//! a time.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, SqliteTx, StudentRecord};
