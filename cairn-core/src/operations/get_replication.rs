use crate::error::{CairnError, Result};
use crate::record::RecordOutcome;
use crate::storage::{RecordTable, TableTx};

/// Surfaces the record most in need of proactive replication and lowers its
/// urgency by one.
#[derive(Clone)]
pub struct GetReplicationOperation {
    table: RecordTable,
}

impl GetReplicationOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    pub async fn run(&self) -> Result<RecordOutcome> {
        let outcome = self.table.write(select_in_tx).await?;

        if let RecordOutcome::Found(record) = &outcome {
            tracing::debug!(
                "replication pick uid={} key={:?} remaining={}",
                record.uid,
                record.key,
                record.replication
            );
        }
        Ok(outcome)
    }
}

fn select_in_tx(tx: &TableTx<'_>) -> Result<RecordOutcome> {
    let Some(mut record) = tx.first_by_replication_descending()? else {
        return Ok(RecordOutcome::NotFound);
    };

    if record.replication > 0 {
        record.replication -= 1;
        if !tx.update_counters(&record)? {
            return Err(CairnError::Internal(format!(
                "record uid={} vanished during replication update",
                record.uid
            )));
        }
    }

    Ok(RecordOutcome::Found(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PutPolicy, StoreConfig};
    use crate::operations::{PutRecordOperation, PutRecordOperationRequest};
    use crate::record::RecordKey;

    fn setup() -> (PutRecordOperation, GetReplicationOperation) {
        let table = RecordTable::open(&StoreConfig::in_memory()).unwrap();
        (
            PutRecordOperation::new(table.clone(), PutPolicy::DedupByValue, 1024),
            GetReplicationOperation::new(table),
        )
    }

    #[tokio::test]
    async fn test_empty_table_not_found() {
        let (_, op) = setup();
        assert_eq!(op.run().await.unwrap(), RecordOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_counter_saturates_at_zero() {
        let (put, op) = setup();
        let key = RecordKey::digest(b"K");
        put.run(PutRecordOperationRequest::new(key, "x").replication(3))
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let record = op.run().await.unwrap().into_record().unwrap();
            seen.push(record.replication);
        }

        assert_eq!(seen, vec![2, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_highest_counter_first_ties_by_uid() {
        let (put, op) = setup();
        let key = RecordKey::digest(b"K");
        let low = put
            .run(PutRecordOperationRequest::new(key, "low").replication(1))
            .await
            .unwrap();
        let high = put
            .run(PutRecordOperationRequest::new(key, "high").replication(2))
            .await
            .unwrap();

        // high: 2 -> 1, now tied with low; the older uid wins the tie.
        assert_eq!(op.run().await.unwrap().into_record().unwrap().uid, high.uid());
        assert_eq!(op.run().await.unwrap().into_record().unwrap().uid, low.uid());
        assert_eq!(op.run().await.unwrap().into_record().unwrap().uid, high.uid());
    }
}
