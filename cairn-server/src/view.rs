use cairn_core::{KeyCount, PutRecordOperationOutcome, Record};
use serde::Serialize;

/// JSON rendering of a record for command output.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub uid: u64,
    pub key: String,
    /// UTF-8 values print as text, anything else as hex.
    pub value: String,
    pub value_hash: String,
    #[serde(rename = "type")]
    pub record_type: u32,
    pub priority: u32,
    pub anonymity: u32,
    pub replication: u32,
    pub expiry: String,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        let value = match std::str::from_utf8(&record.value) {
            Ok(text) => text.to_string(),
            Err(_) => format!("0x{}", hex::encode(&record.value)),
        };

        Self {
            uid: record.uid,
            key: record.key.to_hex(),
            value,
            value_hash: record.value_hash.to_hex(),
            record_type: record.record_type,
            priority: record.priority,
            anonymity: record.anonymity,
            replication: record.replication,
            expiry: record.expiry.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyCountView {
    pub key: String,
    pub count: u64,
}

impl From<&KeyCount> for KeyCountView {
    fn from(entry: &KeyCount) -> Self {
        Self {
            key: entry.key.to_hex(),
            count: entry.count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PutView {
    pub outcome: &'static str,
    pub uid: u64,
}

impl From<PutRecordOperationOutcome> for PutView {
    fn from(outcome: PutRecordOperationOutcome) -> Self {
        let label = match outcome {
            PutRecordOperationOutcome::Inserted { .. } => "inserted",
            PutRecordOperationOutcome::Merged { .. } => "merged",
        };
        Self {
            outcome: label,
            uid: outcome.uid(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    pub path: Option<String>,
    pub records: u64,
    pub estimated_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cairn_core::{RecordKey, Timestamp, ValueHash};

    fn record(value: &'static [u8]) -> Record {
        Record {
            uid: 7,
            key: RecordKey::digest(b"K"),
            value: Bytes::from_static(value),
            value_hash: ValueHash::of(value),
            record_type: 1,
            priority: 2,
            anonymity: 0,
            replication: 3,
            expiry: Timestamp::FOREVER,
        }
    }

    #[test]
    fn test_text_and_binary_values() {
        let text = RecordView::from(&record(b"hello"));
        assert_eq!(text.value, "hello");
        assert_eq!(text.expiry, "never");

        let binary = RecordView::from(&record(&[0xff, 0x00]));
        assert_eq!(binary.value, "0xff00");

        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["key"].as_str().unwrap().len(), 128);
    }
}
