use crate::error::{CairnError, Result};
use bytes::Bytes;
use sha2::{Digest, Sha512};
use std::fmt;

/// Length in bytes of content keys and value hashes.
pub const HASH_LEN: usize = 64;

/// Fixed-length content identifier. Many records may share one key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey([u8; HASH_LEN]);

/// SHA-512 digest of a record value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueHash([u8; HASH_LEN]);

macro_rules! impl_digest_newtype {
    ($name:ident, $what:literal) => {
        impl $name {
            pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let bytes: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
                    CairnError::InvalidRequest(format!(
                        "{} must be {} bytes, got {}",
                        $what,
                        HASH_LEN,
                        bytes.len()
                    ))
                })?;
                Ok(Self(bytes))
            }

            pub fn from_hex(value: &str) -> Result<Self> {
                let bytes = hex::decode(value.trim()).map_err(|e| {
                    CairnError::InvalidRequest(format!("{} is not valid hex: {}", $what, e))
                })?;
                Self::from_slice(&bytes)
            }

            pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short prefix keeps log lines readable.
                write!(f, "{}({}..)", stringify!($name), &self.to_hex()[..16])
            }
        }
    };
}

impl_digest_newtype!(RecordKey, "record key");
impl_digest_newtype!(ValueHash, "value hash");

impl RecordKey {
    /// Derive a key by hashing arbitrary content.
    pub fn digest(data: &[u8]) -> Self {
        Self(sha512(data))
    }
}

impl ValueHash {
    pub fn of(value: &[u8]) -> Self {
        Self(sha512(value))
    }
}

fn sha512(data: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha512::new();
    hasher.update(data);
    let mut digest = [0u8; HASH_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Absolute point in time, microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const FOREVER: Timestamp = Timestamp(i64::MAX);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_micros())
    }

    pub fn after(duration: std::time::Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Self(Self::now().0.saturating_add(micros))
    }

    pub const fn as_micros(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::FOREVER {
            return f.write_str("never");
        }
        match chrono::DateTime::from_timestamp_micros(self.0) {
            Some(at) => f.write_str(&at.to_rfc3339()),
            None => write!(f, "{}us", self.0),
        }
    }
}

/// A stored record as read back from the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub uid: u64,
    pub key: RecordKey,
    pub value: Bytes,
    pub value_hash: ValueHash,
    pub record_type: u32,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiry: Timestamp,
}

impl Record {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expiry < now
    }
}

/// Row contents for an insert; the uid is assigned by the table.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub key: RecordKey,
    pub value: Bytes,
    pub value_hash: ValueHash,
    pub record_type: u32,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiry: Timestamp,
}

/// Consumer verdict on a record handed out by a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Keep,
    Discard,
}

/// Continuation invoked with the selected record inside the transaction.
///
/// Runs on the blocking pool while the record table is locked; it must not
/// call back into the store.
pub type RecordProcessor = Box<dyn FnOnce(&Record) -> Disposition + Send + 'static>;

/// Outcome shared by every selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Found(Record),
    NotFound,
}

impl RecordOutcome {
    pub fn into_record(self) -> Option<Record> {
        match self {
            RecordOutcome::Found(record) => Some(record),
            RecordOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, RecordOutcome::Found(_))
    }
}

impl From<Option<Record>> for RecordOutcome {
    fn from(record: Option<Record>) -> Self {
        match record {
            Some(record) => RecordOutcome::Found(record),
            None => RecordOutcome::NotFound,
        }
    }
}

/// A distinct content key and the number of records sharing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCount {
    pub key: RecordKey,
    pub count: u64,
}
