use super::selection::settle;
use crate::error::Result;
use crate::record::{Disposition, RecordOutcome, RecordProcessor, Timestamp};
use crate::storage::{RecordTable, TableTx};

/// Hands out the soonest-expired record and deletes it unless the consumer
/// vetoes. One record per call; callers loop until `NotFound`.
#[derive(Clone)]
pub struct SweepExpiredOperation {
    table: RecordTable,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepExpiredOperationRequest {
    /// Records with `expiry < now` are due.
    pub now: Timestamp,
}

impl SweepExpiredOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    pub async fn run(
        &self,
        request: SweepExpiredOperationRequest,
        processor: RecordProcessor,
    ) -> Result<RecordOutcome> {
        let SweepExpiredOperationRequest { now } = request;

        let (outcome, disposition) = self
            .table
            .write(move |tx| sweep_in_tx(tx, now, processor))
            .await?;

        if let (RecordOutcome::Found(record), Some(disposition)) = (&outcome, disposition) {
            tracing::debug!(
                "expired uid={} key={:?} expiry={} -> {:?}",
                record.uid,
                record.key,
                record.expiry,
                disposition
            );
        }
        Ok(outcome)
    }
}

fn sweep_in_tx(
    tx: &TableTx<'_>,
    now: Timestamp,
    processor: RecordProcessor,
) -> Result<(RecordOutcome, Option<Disposition>)> {
    let Some(record) = tx.scan_by_expiry_ascending(now).next().transpose()? else {
        return Ok((RecordOutcome::NotFound, None));
    };

    let disposition = settle(tx, &record, Some(processor))?;
    Ok((RecordOutcome::Found(record), Some(disposition)))
}
