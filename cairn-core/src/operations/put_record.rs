use super::selection::find_by_value;
use crate::config::PutPolicy;
use crate::error::{CairnError, Result};
use crate::record::{NewRecord, RecordKey, Timestamp, ValueHash};
use crate::storage::{RecordTable, TableTx};
use bytes::Bytes;

#[derive(Clone)]
pub struct PutRecordOperation {
    table: RecordTable,
    policy: PutPolicy,
    max_value_size: usize,
}

#[derive(Debug, Clone)]
pub struct PutRecordOperationRequest {
    pub key: RecordKey,
    pub value: Bytes,
    pub record_type: u32,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiry: Timestamp,
    /// Caller already knows no record carries this key (e.g. a bloom filter
    /// miss), so the duplicate lookup can be skipped.
    pub key_absent: bool,
}

impl PutRecordOperationRequest {
    pub fn new(key: RecordKey, value: impl Into<Bytes>) -> Self {
        Self {
            key,
            value: value.into(),
            record_type: 0,
            priority: 0,
            anonymity: 0,
            replication: 0,
            expiry: Timestamp::FOREVER,
            key_absent: false,
        }
    }

    pub fn record_type(mut self, record_type: u32) -> Self {
        self.record_type = record_type;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn anonymity(mut self, anonymity: u32) -> Self {
        self.anonymity = anonymity;
        self
    }

    pub fn replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    pub fn expiry(mut self, expiry: Timestamp) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn key_absent(mut self, key_absent: bool) -> Self {
        self.key_absent = key_absent;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutRecordOperationOutcome {
    Inserted { uid: u64 },
    Merged { uid: u64 },
}

impl PutRecordOperationOutcome {
    pub fn uid(&self) -> u64 {
        match self {
            PutRecordOperationOutcome::Inserted { uid }
            | PutRecordOperationOutcome::Merged { uid } => *uid,
        }
    }
}

impl PutRecordOperation {
    pub fn new(table: RecordTable, policy: PutPolicy, max_value_size: usize) -> Self {
        Self {
            table,
            policy,
            max_value_size,
        }
    }

    pub async fn run(
        &self,
        request: PutRecordOperationRequest,
    ) -> Result<PutRecordOperationOutcome> {
        let PutRecordOperationRequest {
            key,
            value,
            record_type,
            priority,
            anonymity,
            replication,
            expiry,
            key_absent,
        } = request;

        if value.len() > self.max_value_size {
            return Err(CairnError::InvalidRequest(format!(
                "value too large: {} bytes (max {})",
                value.len(),
                self.max_value_size
            )));
        }

        let incoming = NewRecord {
            key,
            value_hash: ValueHash::of(&value),
            value,
            record_type,
            priority,
            anonymity,
            replication,
            expiry,
        };
        let policy = self.policy;

        let outcome = self
            .table
            .write(move |tx| put_in_tx(tx, policy, key_absent, &incoming))
            .await?;

        tracing::debug!("put key={:?} type={} -> {:?}", key, record_type, outcome);
        Ok(outcome)
    }
}

fn put_in_tx(
    tx: &TableTx<'_>,
    policy: PutPolicy,
    key_absent: bool,
    incoming: &NewRecord,
) -> Result<PutRecordOperationOutcome> {
    let existing = if key_absent {
        None
    } else {
        match policy {
            PutPolicy::DedupByValue => find_by_value(tx, &incoming.key, &incoming.value)?,
            PutPolicy::UpsertByValueHash => {
                tx.find_by_value_hash(&incoming.key, &incoming.value_hash)?
            }
        }
    };

    let Some(mut record) = existing else {
        let uid = tx.insert(incoming)?;
        return Ok(PutRecordOperationOutcome::Inserted { uid });
    };

    record.priority = record.priority.saturating_add(incoming.priority);
    record.replication = record.replication.saturating_add(incoming.replication);
    record.expiry = record.expiry.max(incoming.expiry);

    if !tx.update_counters(&record)? {
        return Err(CairnError::Internal(format!(
            "record uid={} vanished during merge",
            record.uid
        )));
    }

    Ok(PutRecordOperationOutcome::Merged { uid: record.uid })
}
