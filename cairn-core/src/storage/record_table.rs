use super::cursor::{IndexScan, RecordCursor};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::record::{NewRecord, Record, RecordKey, Timestamp, ValueHash};
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{
    Connection, OptionalExtension, Params, Row, Transaction, TransactionBehavior, params,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub(crate) const RECORD_COLUMNS: &str =
    "uid, key, value, value_hash, type, priority, anonymity, replication, expiry";

/// Physical storage for records and their secondary indices.
///
/// A single SQLite connection sits behind a mutex; every access goes through
/// [`RecordTable::read`] or [`RecordTable::write`], which run the closure on
/// the blocking pool inside one transaction.
#[derive(Clone)]
pub struct RecordTable {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    scan_batch_size: usize,
}

impl RecordTable {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let conn = Connection::open(path)?;
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        init_schema(&conn)?;

        tracing::info!(
            "record table opened at {}",
            config
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string())
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: config.path.clone(),
            scan_batch_size: config.scan_batch_size,
        })
    }

    /// Database file backing the table, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn scan_batch_size(&self) -> usize {
        self.scan_batch_size
    }

    /// Run `f` inside a deferred (read) transaction.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TableTx<'_>) -> Result<T> + Send + 'static,
    {
        self.run(TransactionBehavior::Deferred, f).await
    }

    /// Run `f` inside an immediate (write) transaction. An error returned by
    /// `f` rolls every change back.
    pub async fn write<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TableTx<'_>) -> Result<T> + Send + 'static,
    {
        self.run(TransactionBehavior::Immediate, f).await
    }

    async fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TableTx<'_>) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let scan_batch_size = self.scan_batch_size;

        tokio::task::spawn_blocking(move || {
            // A panicking record processor poisons the lock, but its
            // transaction was rolled back while unwinding.
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = conn.transaction_with_behavior(behavior)?;
            let table = TableTx {
                tx,
                scan_batch_size,
            };
            let output = f(&table)?;
            table.tx.commit()?;
            Ok(output)
        })
        .await?
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    // AUTOINCREMENT keeps uids from being reused after deletes.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            uid INTEGER PRIMARY KEY AUTOINCREMENT,
            key BLOB NOT NULL,
            value BLOB NOT NULL,
            value_hash BLOB NOT NULL,
            type INTEGER NOT NULL,
            priority INTEGER NOT NULL,
            anonymity INTEGER NOT NULL,
            replication INTEGER NOT NULL,
            expiry INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_key ON records(key, uid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_key_hash ON records(key, value_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_anon_type
         ON records(anonymity, type, uid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_replication
         ON records(replication DESC, uid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_expiry ON records(expiry, uid)",
        [],
    )?;

    Ok(())
}

/// Typed access to the record table within one transaction.
pub struct TableTx<'c> {
    tx: Transaction<'c>,
    scan_batch_size: usize,
}

impl TableTx<'_> {
    /// Insert a row and return its freshly assigned uid.
    pub fn insert(&self, record: &NewRecord) -> Result<u64> {
        self.tx.execute(
            "INSERT INTO records (
                key, value, value_hash, type, priority, anonymity, replication, expiry
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.key.as_bytes().as_slice(),
                record.value.as_ref(),
                record.value_hash.as_bytes().as_slice(),
                record.record_type,
                record.priority,
                record.anonymity,
                record.replication,
                record.expiry.as_micros(),
            ],
        )?;

        Ok(self.tx.last_insert_rowid() as u64)
    }

    pub fn get(&self, uid: u64) -> Result<Option<Record>> {
        let record = self
            .tx
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE uid = ?1"),
                [uid as i64],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Oldest row with the given key and value hash.
    pub fn find_by_value_hash(
        &self,
        key: &RecordKey,
        value_hash: &ValueHash,
    ) -> Result<Option<Record>> {
        let record = self
            .tx
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE key = ?1 AND value_hash = ?2
                     ORDER BY uid LIMIT 1"
                ),
                params![key.as_bytes().as_slice(), value_hash.as_bytes().as_slice()],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Persist the mutable counters (`priority`, `replication`, `expiry`) of
    /// `record`. Returns false if the row no longer exists.
    pub fn update_counters(&self, record: &Record) -> Result<bool> {
        let affected = self.tx.execute(
            "UPDATE records SET priority = ?1, replication = ?2, expiry = ?3
             WHERE uid = ?4",
            params![
                record.priority,
                record.replication,
                record.expiry.as_micros(),
                record.uid as i64,
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn delete(&self, uid: u64) -> Result<bool> {
        let affected = self
            .tx
            .execute("DELETE FROM records WHERE uid = ?1", [uid as i64])?;
        Ok(affected > 0)
    }

    /// Every record in uid order, starting at `uid_floor`.
    pub fn scan_all(&self, uid_floor: u64) -> RecordCursor<'_> {
        self.cursor(IndexScan::All, uid_floor)
    }

    /// Records sharing `key` in uid order, starting at `uid_floor`.
    pub fn scan_by_key(&self, key: &RecordKey, uid_floor: u64) -> RecordCursor<'_> {
        self.cursor(IndexScan::ByKey(*key), uid_floor)
    }

    pub fn scan_by_anonymity_and_type(
        &self,
        anonymity: u32,
        record_type: u32,
        uid_floor: u64,
    ) -> RecordCursor<'_> {
        self.cursor(
            IndexScan::ByAnonymityAndType {
                anonymity,
                record_type,
            },
            uid_floor,
        )
    }

    /// Records with `expiry < before`, soonest first.
    pub fn scan_by_expiry_ascending(&self, before: Timestamp) -> RecordCursor<'_> {
        self.cursor(IndexScan::ExpiringBefore(before), 0)
    }

    /// Head of the by-replication index; ties go to the lowest uid.
    pub fn first_by_replication_descending(&self) -> Result<Option<Record>> {
        let record = self
            .tx
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     ORDER BY replication DESC, uid ASC LIMIT 1"
                ),
                [],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Up to `limit` distinct keys strictly greater than `after`, ascending.
    pub fn distinct_keys_after(
        &self,
        after: Option<&RecordKey>,
        limit: usize,
    ) -> Result<Vec<RecordKey>> {
        let after: &[u8] = after.map(|key| key.as_bytes().as_slice()).unwrap_or(&[]);
        let mut stmt = self.tx.prepare_cached(
            "SELECT DISTINCT key FROM records WHERE key > ?1 ORDER BY key LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![after, limit.max(1) as i64], |row| {
            let key: Vec<u8> = row.get(0)?;
            RecordKey::from_slice(&key)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Blob, Box::new(e)))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }

        Ok(keys)
    }

    pub fn count_by_key(&self, key: &RecordKey) -> Result<u64> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM records WHERE key = ?1",
            [key.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove every record. The uid sequence is left untouched.
    pub fn clear(&self) -> Result<u64> {
        let affected = self.tx.execute("DELETE FROM records", [])?;
        Ok(affected as u64)
    }

    /// Bytes used by the database file (pages in use times page size).
    pub fn estimate_size(&self) -> Result<u64> {
        let page_count: i64 = self
            .tx
            .query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = self
            .tx
            .query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count.max(0) as u64).saturating_mul(page_size.max(0) as u64))
    }

    fn cursor(&self, scan: IndexScan, uid_floor: u64) -> RecordCursor<'_> {
        RecordCursor::new(&self.tx, scan, uid_floor, self.scan_batch_size)
    }
}

pub(crate) fn query_records<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, record_from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }

    Ok(records)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let uid: i64 = row.get(0)?;
    let key: Vec<u8> = row.get(1)?;
    let value: Vec<u8> = row.get(2)?;
    let value_hash: Vec<u8> = row.get(3)?;

    Ok(Record {
        uid: uid as u64,
        key: RecordKey::from_slice(&key)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Blob, Box::new(e)))?,
        value: Bytes::from(value),
        value_hash: ValueHash::from_slice(&value_hash)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Blob, Box::new(e)))?,
        record_type: row.get(4)?,
        priority: row.get(5)?,
        anonymity: row.get(6)?,
        replication: row.get(7)?,
        expiry: Timestamp::from_micros(row.get(8)?),
    })
}
