use super::selection::{select_with_wraparound, settle};
use crate::error::Result;
use crate::record::{RecordOutcome, RecordProcessor};
use crate::storage::{RecordTable, TableTx};

#[derive(Clone)]
pub struct GetZeroAnonymityOperation {
    table: RecordTable,
}

#[derive(Debug, Clone, Default)]
pub struct GetZeroAnonymityOperationRequest {
    pub record_type: u32,
    pub start_offset: u64,
    pub uid_floor: u64,
}

impl GetZeroAnonymityOperationRequest {
    pub fn new(record_type: u32) -> Self {
        Self {
            record_type,
            ..Self::default()
        }
    }

    pub fn start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn uid_floor(mut self, uid_floor: u64) -> Self {
        self.uid_floor = uid_floor;
        self
    }

    pub fn random(mut self) -> Self {
        self.start_offset = u64::from(rand::random::<u32>());
        self
    }
}

impl GetZeroAnonymityOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    pub async fn run(
        &self,
        request: GetZeroAnonymityOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome> {
        if processor.is_some() {
            self.table
                .write(move |tx| select_in_tx(tx, &request, processor))
                .await
        } else {
            self.table
                .read(move |tx| select_in_tx(tx, &request, None))
                .await
        }
    }
}

fn select_in_tx(
    tx: &TableTx<'_>,
    request: &GetZeroAnonymityOperationRequest,
    processor: Option<RecordProcessor>,
) -> Result<RecordOutcome> {
    let selected = select_with_wraparound(
        request.start_offset,
        request.uid_floor,
        |floor| tx.scan_by_anonymity_and_type(0, request.record_type, floor),
        |_| true,
    )?;

    let Some(record) = selected else {
        return Ok(RecordOutcome::NotFound);
    };

    settle(tx, &record, processor)?;
    Ok(RecordOutcome::Found(record))
}
