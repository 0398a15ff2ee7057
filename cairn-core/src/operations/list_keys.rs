use crate::error::{CairnError, Result};
use crate::record::{KeyCount, RecordKey};
use crate::storage::RecordTable;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;

/// Lazy, finite sequence of distinct keys with their record counts, in key
/// order. Ends after the last key; it cannot be restarted.
pub type KeyStream = BoxStream<'static, Result<KeyCount>>;

#[derive(Clone)]
pub struct ListKeysOperation {
    table: RecordTable,
}

struct ListKeysState {
    table: RecordTable,
    after: Option<RecordKey>,
    page: VecDeque<KeyCount>,
    page_size: usize,
    exhausted: bool,
}

impl ListKeysOperation {
    pub fn new(table: RecordTable) -> Self {
        Self { table }
    }

    /// Each page is read in its own short transaction, so callers may issue
    /// other store calls while draining the stream.
    pub fn run(&self) -> KeyStream {
        let state = ListKeysState {
            page_size: self.table.scan_batch_size().max(1),
            table: self.table.clone(),
            after: None,
            page: VecDeque::new(),
            exhausted: false,
        };

        stream::try_unfold(state, |mut state| async move {
            if state.page.is_empty() && !state.exhausted {
                let after = state.after;
                let page_size = state.page_size;

                let page = state
                    .table
                    .read(move |tx| {
                        let keys = tx.distinct_keys_after(after.as_ref(), page_size)?;
                        keys.into_iter()
                            .map(|key| {
                                Ok(KeyCount {
                                    count: tx.count_by_key(&key)?,
                                    key,
                                })
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .await?;

                if page.len() < page_size {
                    state.exhausted = true;
                }
                if let Some(last) = page.last() {
                    state.after = Some(last.key);
                }
                state.page.extend(page);
            }

            Ok::<_, CairnError>(state.page.pop_front().map(|entry| (entry, state)))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PutPolicy, StoreConfig};
    use crate::operations::{PutRecordOperation, PutRecordOperationRequest};
    use futures_util::TryStreamExt;

    #[tokio::test]
    async fn test_empty_table_yields_nothing() {
        let table = RecordTable::open(&StoreConfig::in_memory()).unwrap();
        let keys: Vec<KeyCount> = ListKeysOperation::new(table).run().try_collect().await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_with_counts_across_pages() {
        let config = StoreConfig::in_memory().with_scan_batch_size(2);
        let table = RecordTable::open(&config).unwrap();
        let put = PutRecordOperation::new(table.clone(), PutPolicy::DedupByValue, 1024);

        let mut expected = Vec::new();
        for n in 0u8..5 {
            let key = RecordKey::new([n; 64]);
            for v in 0..=n {
                put.run(PutRecordOperationRequest::new(key, vec![v]))
                    .await
                    .unwrap();
            }
            expected.push(KeyCount {
                key,
                count: u64::from(n) + 1,
            });
        }

        let keys: Vec<KeyCount> = ListKeysOperation::new(table).run().try_collect().await.unwrap();
        assert_eq!(keys, expected);
    }
}
