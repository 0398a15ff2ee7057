mod selection;

pub mod get_by_key;
pub mod get_replication;
pub mod get_zero_anonymity;
pub mod list_keys;
pub mod put_record;
pub mod remove_record;
pub mod sweep_expired;
pub mod update_record;

pub use get_by_key::{GetByKeyOperation, GetByKeyOperationRequest};
pub use get_replication::GetReplicationOperation;
pub use get_zero_anonymity::{GetZeroAnonymityOperation, GetZeroAnonymityOperationRequest};
pub use list_keys::{KeyStream, ListKeysOperation};
pub use put_record::{PutRecordOperation, PutRecordOperationOutcome, PutRecordOperationRequest};
pub use remove_record::{
    RemoveRecordOperation, RemoveRecordOperationOutcome, RemoveRecordOperationRequest,
};
pub use sweep_expired::{SweepExpiredOperation, SweepExpiredOperationRequest};
pub use update_record::{
    UpdateRecordOperation, UpdateRecordOperationOutcome, UpdateRecordOperationRequest,
};
