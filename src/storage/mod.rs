//! Record Store: SQLite-backed persistence for memory records, the access
//! log, and the raw embedding table.
//!
//! Handles connection management, WAL mode, and schema migrations; row-level
//! query logic lives in [`queries`].

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use queries::{AggregateCounts, FieldValue, ScanFilters};
