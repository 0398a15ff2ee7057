//! Cairn Core - content-addressed record store for overlay network nodes
//!
//! Records are keyed by 64-byte digests and carry routing metadata:
//! - merge-on-put deduplication of identical values
//! - offset selection with wraparound for fair retrieval
//! - replication and expiry driven maintenance selectors
//! - SQLite for durable, transactional storage

pub mod config;
pub mod datastore;
pub mod error;
pub mod operations;
pub mod record;
pub mod storage;

pub use config::{PutPolicy, StoreConfig};
pub use datastore::{Datastore, SqliteDatastore};
pub use error::{CairnError, Result};
pub use operations::{
    GetByKeyOperationRequest, GetZeroAnonymityOperationRequest, KeyStream,
    PutRecordOperationOutcome, PutRecordOperationRequest, RemoveRecordOperationOutcome,
    RemoveRecordOperationRequest, UpdateRecordOperationOutcome, UpdateRecordOperationRequest,
};
pub use record::{
    Disposition, HASH_LEN, KeyCount, Record, RecordKey, RecordOutcome, RecordProcessor,
    Timestamp, ValueHash,
};
pub use storage::{RecordCursor, RecordTable, TableTx};
