use super::selection::{select_with_wraparound, settle};
use crate::error::Result;
use crate::record::{Record, RecordKey, RecordOutcome, RecordProcessor, ValueHash};
use crate::storage::{RecordTable, TableTx};

#[derive(Clone)]
pub struct GetByKeyOperation {
    table: RecordTable,
}

#[derive(Debug, Clone, Default)]
pub struct GetByKeyOperationRequest {
    /// `None` walks the whole table in uid order.
    pub key: Option<RecordKey>,
    pub record_type: Option<u32>,
    pub value_hash: Option<ValueHash>,
    /// Number of eligible records to skip, modulo how many exist.
    pub start_offset: u64,
    /// Resume point for repeated calls ("continue after the last result").
    pub uid_floor: u64,
}

impl GetByKeyOperationRequest {
    pub fn for_key(key: RecordKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn any_key() -> Self {
        Self::default()
    }

    pub fn record_type(mut self, record_type: u32) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn value_hash(mut self, value_hash: ValueHash) -> Self {
        self.value_hash = Some(value_hash);
        self
    }

    pub fn start_offset(mut self, start_offset: u64) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn uid_floor(mut self, uid_floor: u64) -> Self {
        self.uid_floor = uid_floor;
        self
    }

    /// Sample a pseudo-random matching record instead of walking in order.
    pub fn random(mut self) -> Self {
        self.start_offset = u64::from(rand::random::<u32>());
        self
    }

    fn matches(&self, record: &Record) -> bool {
        self.record_type.is_none_or(|t| t == record.record_type)
            && self.value_hash.is_none_or(|h| h == record.value_hash)
    }
}

impl GetByKeyOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    pub async fn run(
        &self,
        request: GetByKeyOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome> {
        // Only a consumer that may discard needs a write transaction.
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
    request: &GetByKeyOperationRequest,
    processor: Option<RecordProcessor>,
) -> Result<RecordOutcome> {
    let selected = select_with_wraparound(
        request.start_offset,
        request.uid_floor,
        |floor| match &request.key {
            Some(key) => tx.scan_by_key(key, floor),
            None => tx.scan_all(floor),
        },
        |record| request.matches(record),
    )?;

    let Some(record) = selected else {
        return Ok(RecordOutcome::NotFound);
    };

    settle(tx, &record, processor)?;
    Ok(RecordOutcome::Found(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PutPolicy, StoreConfig};
    use crate::operations::{PutRecordOperation, PutRecordOperationRequest};
    use crate::record::Disposition;

    async fn seeded(values: &[(&'static str, u32)]) -> (RecordTable, RecordKey, Vec<u64>) {
        let config = StoreConfig::in_memory().with_scan_batch_size(2);
        let table = RecordTable::open(&config).unwrap();
        let put = PutRecordOperation::new(table.clone(), PutPolicy::DedupByValue, 1024);
        let key = RecordKey::digest(b"K");

        let mut uids = Vec::new();
        for (value, record_type) in values {
            let outcome = put
                .run(PutRecordOperationRequest::new(key, *value).record_type(*record_type))
                .await
                .unwrap();
            uids.push(outcome.uid());
        }
        (table, key, uids)
    }

    async fn value_at(op: &GetByKeyOperation, request: GetByKeyOperationRequest) -> Option<String> {
        op.run(request, None)
            .await
            .unwrap()
            .into_record()
            .map(|r| String::from_utf8(r.value.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_offset_walks_in_insertion_order() {
        let (table, key, _) = seeded(&[("a", 1), ("b", 1), ("c", 1)]).await;
        let op = GetByKeyOperation::new(table);

        for (offset, expected) in ["a", "b", "c"].iter().enumerate() {
            let request = GetByKeyOperationRequest::for_key(key).start_offset(offset as u64);
            assert_eq!(value_at(&op, request).await.as_deref(), Some(*expected));
        }
    }

    #[tokio::test]
    async fn test_offset_wraps_modulo_match_count() {
        let (table, key, _) = seeded(&[("a", 1), ("b", 1), ("c", 1)]).await;
        let op = GetByKeyOperation::new(table);

        for j in 0..3u64 {
            let direct =
                value_at(&op, GetByKeyOperationRequest::for_key(key).start_offset(j)).await;
            let wrapped =
                value_at(&op, GetByKeyOperationRequest::for_key(key).start_offset(3 + j)).await;
            let twice =
                value_at(&op, GetByKeyOperationRequest::for_key(key).start_offset(6 + j)).await;
            assert_eq!(direct, wrapped);
            assert_eq!(direct, twice);
        }
    }

    #[tokio::test]
    async fn test_type_filter_counts_only_eligible() {
        let (table, key, _) = seeded(&[("a", 1), ("b", 2), ("c", 1), ("d", 2)]).await;
        let op = GetByKeyOperation::new(table);

        let request = GetByKeyOperationRequest::for_key(key).record_type(2);
        assert_eq!(value_at(&op, request.clone()).await.as_deref(), Some("b"));
        assert_eq!(
            value_at(&op, request.clone().start_offset(1)).await.as_deref(),
            Some("d")
        );
        assert_eq!(value_at(&op, request.start_offset(2)).await.as_deref(), Some("b"));

        let missing = GetByKeyOperationRequest::for_key(key).record_type(9);
        assert_eq!(value_at(&op, missing).await, None);
    }

    #[tokio::test]
    async fn test_value_hash_filter() {
        let (table, key, _) = seeded(&[("a", 1), ("b", 1)]).await;
        let op = GetByKeyOperation::new(table);

        let request = GetByKeyOperationRequest::for_key(key).value_hash(ValueHash::of(b"b"));
        assert_eq!(value_at(&op, request).await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_uid_floor_resumes_and_wraps() {
        let (table, key, uids) = seeded(&[("a", 1), ("b", 1), ("c", 1)]).await;
        let op = GetByKeyOperation::new(table);

        let after_first = GetByKeyOperationRequest::for_key(key).uid_floor(uids[0] + 1);
        assert_eq!(value_at(&op, after_first).await.as_deref(), Some("b"));

        let past_end = GetByKeyOperationRequest::for_key(key).uid_floor(uids[2] + 1);
        assert_eq!(value_at(&op, past_end).await.as_deref(), Some("a"));

        // Two records remain above the floor, then the walk restarts at "a".
        let wrapped = GetByKeyOperationRequest::for_key(key)
            .uid_floor(uids[1])
            .start_offset(2);
        assert_eq!(value_at(&op, wrapped).await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_missing_key_not_found() {
        let (table, _, _) = seeded(&[("a", 1)]).await;
        let op = GetByKeyOperation::new(table);

        let request =
            GetByKeyOperationRequest::for_key(RecordKey::digest(b"other")).start_offset(5);
        assert_eq!(op.run(request, None).await.unwrap(), RecordOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_any_key_walks_whole_table() {
        let (table, _, _) = seeded(&[("a", 1), ("b", 1)]).await;
        let other = RecordKey::digest(b"other");
        table
            .write(move |tx| {
                tx.insert(&crate::record::NewRecord {
                    key: other,
                    value: bytes::Bytes::from_static(b"z"),
                    value_hash: ValueHash::of(b"z"),
                    record_type: 1,
                    priority: 0,
                    anonymity: 1,
                    replication: 0,
                    expiry: crate::record::Timestamp::FOREVER,
                })
            })
            .await
            .unwrap();
        let op = GetByKeyOperation::new(table);

        let request = GetByKeyOperationRequest::any_key().start_offset(2);
        assert_eq!(value_at(&op, request).await.as_deref(), Some("z"));
    }

    #[tokio::test]
    async fn test_discard_deletes_selected_record() {
        let (table, key, uids) = seeded(&[("a", 1), ("b", 1)]).await;
        let op = GetByKeyOperation::new(table.clone());

        let outcome = op
            .run(
                GetByKeyOperationRequest::for_key(key),
                Some(Box::new(|_: &Record| Disposition::Discard)),
            )
            .await
            .unwrap();
        assert_eq!(outcome.into_record().map(|r| r.uid), Some(uids[0]));

        let first = uids[0];
        assert!(table.read(move |tx| tx.get(first)).await.unwrap().is_none());
        assert_eq!(table.read(|tx| tx.count()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_random_offset_finds_a_match() {
        let (table, key, _) = seeded(&[("a", 1), ("b", 1), ("c", 1)]).await;
        let op = GetByKeyOperation::new(table);

        let request = GetByKeyOperationRequest::for_key(key).random();
        assert!(op.run(request, None).await.unwrap().is_found());
    }
}
