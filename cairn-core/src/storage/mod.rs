//! Storage modules for Cairn
//!
//! Provides the SQLite-backed record table and its index cursors.

pub mod cursor;
pub mod record_table;

pub use cursor::RecordCursor;
pub use record_table::{RecordTable, TableTx};
