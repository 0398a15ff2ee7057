use super::selection::find_by_value;
use crate::error::Result;
use crate::record::RecordKey;
use crate::storage::RecordTable;
use bytes::Bytes;

#[derive(Clone)]
pub struct RemoveRecordOperation {
    table: RecordTable,
}

#[derive(Debug, Clone)]
pub struct RemoveRecordOperationRequest {
    pub key: RecordKey,
    pub value: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveRecordOperationOutcome {
    Removed { uid: u64 },
    NotFound,
}

impl RemoveRecordOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    /// Delete the oldest record under `key` whose value matches exactly.
    pub async fn run(
        &self,
        request: RemoveRecordOperationRequest,
    ) -> Result<RemoveRecordOperationOutcome> {
        let RemoveRecordOperationRequest { key, value } = request;

        let outcome = self
            .table
            .write(move |tx| {
                let Some(record) = find_by_value(tx, &key, &value)? else {
                    return Ok(RemoveRecordOperationOutcome::NotFound);
                };
                tx.delete(record.uid)?;
                Ok(RemoveRecordOperationOutcome::Removed { uid: record.uid })
            })
            .await?;

        tracing::debug!("remove key={:?} -> {:?}", key, outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PutPolicy, StoreConfig};
    use crate::operations::{PutRecordOperation, PutRecordOperationRequest};

    #[tokio::test]
    async fn test_removes_exact_match_only() {
        let table = RecordTable::open(&StoreConfig::in_memory()).unwrap();
        let put = PutRecordOperation::new(table.clone(), PutPolicy::DedupByValue, 1024);
        let op = RemoveRecordOperation::new(table.clone());
        let key = RecordKey::digest(b"K");

        put.run(PutRecordOperationRequest::new(key, "a")).await.unwrap();
        let b = put.run(PutRecordOperationRequest::new(key, "b")).await.unwrap();

        let outcome = op
            .run(RemoveRecordOperationRequest {
                key,
                value: Bytes::from_static(b"b"),
            })
            .await
            .unwrap();
        assert_eq!(outcome, RemoveRecordOperationOutcome::Removed { uid: b.uid() });

        let again = op
            .run(RemoveRecordOperationRequest {
                key,
                value: Bytes::from_static(b"b"),
            })
            .await
            .unwrap();
        assert_eq!(again, RemoveRecordOperationOutcome::NotFound);

        let prefix = op
            .run(RemoveRecordOperationRequest {
                key,
                value: Bytes::from_static(b""),
            })
            .await
            .unwrap();
        assert_eq!(prefix, RemoveRecordOperationOutcome::NotFound);
        assert_eq!(table.read(|tx| tx.count()).await.unwrap(), 1);
    }
}
