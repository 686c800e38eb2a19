//! Item Store — persistence for checkable items, verdicts and per-user
//! occurrence counters.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{CheckableItem, ItemStore};
