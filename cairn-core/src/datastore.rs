use crate::config::StoreConfig;
use crate::error::Result;
use crate::operations::{
    GetByKeyOperation, GetByKeyOperationRequest, GetReplicationOperation,
    GetZeroAnonymityOperation, GetZeroAnonymityOperationRequest, KeyStream, ListKeysOperation,
    PutRecordOperation, PutRecordOperationOutcome, PutRecordOperationRequest,
    RemoveRecordOperation, RemoveRecordOperationOutcome, RemoveRecordOperationRequest,
    SweepExpiredOperation, SweepExpiredOperationRequest, UpdateRecordOperation,
    UpdateRecordOperationOutcome, UpdateRecordOperationRequest,
};
use crate::record::{RecordOutcome, RecordProcessor, Timestamp};
use crate::storage::RecordTable;
use async_trait::async_trait;
use std::path::Path;

/// Entry points of a record store.
///
/// Every call resolves exactly once. Record processors run inside the
/// store's transaction and must not call back into the store.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn put(&self, request: PutRecordOperationRequest) -> Result<PutRecordOperationOutcome>;

    async fn get_key(
        &self,
        request: GetByKeyOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome>;

    /// Most replicated record, with its replication counter decremented.
    async fn get_replication(&self) -> Result<RecordOutcome>;

    /// Soonest record with `expiry < now`; deleted unless the processor keeps it.
    async fn get_expiration(
        &self,
        now: Timestamp,
        processor: RecordProcessor,
    ) -> Result<RecordOutcome>;

    async fn get_zero_anonymity(
        &self,
        request: GetZeroAnonymityOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome>;

    fn get_keys(&self) -> KeyStream;

    async fn remove_key(
        &self,
        request: RemoveRecordOperationRequest,
    ) -> Result<RemoveRecordOperationOutcome>;

    async fn update(
        &self,
        request: UpdateRecordOperationRequest,
    ) -> Result<UpdateRecordOperationOutcome>;

    /// Approximate on-disk footprint in bytes.
    async fn estimate_size(&self) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    /// Remove every record. Uids handed out later still never repeat.
    async fn drop_all(&self) -> Result<u64>;
}

/// [`Datastore`] backed by a single SQLite database.
#[derive(Clone)]
pub struct SqliteDatastore {
    table: RecordTable,
    put_record: PutRecordOperation,
    get_by_key: GetByKeyOperation,
    get_replication: GetReplicationOperation,
    sweep_expired: SweepExpiredOperation,
    get_zero_anonymity: GetZeroAnonymityOperation,
    list_keys: ListKeysOperation,
    remove_record: RemoveRecordOperation,
    update_record: UpdateRecordOperation,
}

impl SqliteDatastore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let table = RecordTable::open(config)?;

        tracing::info!(
            "datastore ready (put_policy={:?}, scan_batch_size={}, max_value_size={})",
            config.put_policy,
            config.scan_batch_size,
            config.max_value_size
        );

        Ok(Self {
            put_record: PutRecordOperation::new(
                table.clone(),
                config.put_policy,
                config.max_value_size,
            ),
            get_by_key: GetByKeyOperation::new(table.clone()),
            get_replication: GetReplicationOperation::new(table.clone()),
            sweep_expired: SweepExpiredOperation::new(table.clone()),
            get_zero_anonymity: GetZeroAnonymityOperation::new(table.clone()),
            list_keys: ListKeysOperation::new(table.clone()),
            remove_record: RemoveRecordOperation::new(table.clone()),
            update_record: UpdateRecordOperation::new(table.clone()),
            table,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.table.path()
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn put(&self, request: PutRecordOperationRequest) -> Result<PutRecordOperationOutcome> {
        self.put_record.run(request).await
    }

    async fn get_key(
        &self,
        request: GetByKeyOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome> {
        self.get_by_key.run(request, processor).await
    }

    async fn get_replication(&self) -> Result<RecordOutcome> {
        self.get_replication.run().await
    }

    async fn get_expiration(
        &self,
        now: Timestamp,
        processor: RecordProcessor,
    ) -> Result<RecordOutcome> {
        self.sweep_expired
            .run(SweepExpiredOperationRequest { now }, processor)
            .await
    }

    async fn get_zero_anonymity(
        &self,
        request: GetZeroAnonymityOperationRequest,
        processor: Option<RecordProcessor>,
    ) -> Result<RecordOutcome> {
        self.get_zero_anonymity.run(request, processor).await
    }

    fn get_keys(&self) -> KeyStream {
        self.list_keys.run()
    }

    async fn remove_key(
        &self,
        request: RemoveRecordOperationRequest,
    ) -> Result<RemoveRecordOperationOutcome> {
        self.remove_record.run(request).await
    }

    async fn update(
        &self,
        request: UpdateRecordOperationRequest,
    ) -> Result<UpdateRecordOperationOutcome> {
        self.update_record.run(request).await
    }

    async fn estimate_size(&self) -> Result<u64> {
        self.table.read(|tx| tx.estimate_size()).await
    }

    async fn count(&self) -> Result<u64> {
        self.table.read(|tx| tx.count()).await
    }

    async fn drop_all(&self) -> Result<u64> {
        let removed = self.table.write(|tx| tx.clear()).await?;
        tracing::info!("dropped {} records", removed);
        Ok(removed)
    }
}
