use crate::error::{CairnError, Result};
use crate::record::{Record, Timestamp};
use crate::storage::RecordTable;

#[derive(Clone)]
pub struct UpdateRecordOperation {
    table: RecordTable,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateRecordOperationRequest {
    pub uid: u64,
    pub priority_delta: u32,
    /// Only ever extends the stored expiry.
    pub expiry: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRecordOperationOutcome {
    Updated(Record),
    NotFound,
}

impl UpdateRecordOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    pub async fn run(
        &self,
        request: UpdateRecordOperationRequest,
    ) -> Result<UpdateRecordOperationOutcome> {
        let UpdateRecordOperationRequest {
            uid,
            priority_delta,
            expiry,
        } = request;

        self.table
            .write(move |tx| {
                let Some(mut record) = tx.get(uid)? else {
                    return Ok(UpdateRecordOperationOutcome::NotFound);
                };
                record.priority = record.priority.saturating_add(priority_delta);
                record.expiry = record.expiry.max(expiry);
                if !tx.update_counters(&record)? {
                    return Err(CairnError::Internal(format!(
                        "record uid={} vanished during update",
                        record.uid
                    )));
                }
                Ok(UpdateRecordOperationOutcome::Updated(record))
            })
            .await
    }
}
