use crate::error::Result;
use crate::record::{Disposition, Record, RecordKey, RecordProcessor};
use crate::storage::{RecordCursor, TableTx};

/// Pick the `start_offset`-th eligible record at or after `uid_floor`.
///
/// When the walk runs off the end it restarts at uid 0. Once a pass that
/// started at uid 0 is exhausted, every eligible record has been counted and
/// the remaining offset is reduced modulo that count, so the next pass is
/// guaranteed to land on a record.
pub(crate) fn select_with_wraparound<'t, S, P>(
    start_offset: u64,
    uid_floor: u64,
    mut open: S,
    mut eligible: P,
) -> Result<Option<Record>>
where
    S: FnMut(u64) -> RecordCursor<'t>,
    P: FnMut(&Record) -> bool,
{
    let mut offset = start_offset;
    let mut floor = uid_floor;

    loop {
        let mut skipped = 0u64;

        for record in open(floor) {
            let record = record?;
            if !eligible(&record) {
                continue;
            }
            if offset > 0 {
                offset -= 1;
                skipped += 1;
                continue;
            }
            return Ok(Some(record));
        }

        if floor == 0 {
            if skipped == 0 {
                return Ok(None);
            }
            offset %= skipped;
        }
        floor = 0;
    }
}

/// Hand `record` to the consumer and delete it if they discard it.
pub(crate) fn settle(
    tx: &TableTx<'_>,
    record: &Record,
    processor: Option<RecordProcessor>,
) -> Result<Disposition> {
    let disposition = processor
        .map(|processor| processor(record))
        .unwrap_or_default();

    if disposition == Disposition::Discard {
        tx.delete(record.uid)?;
        tracing::debug!("Discarded record uid={} key={:?}", record.uid, record.key);
    }

    Ok(disposition)
}

/// First record under `key` whose value matches byte for byte.
pub(crate) fn find_by_value(
    tx: &TableTx<'_>,
    key: &RecordKey,
    value: &[u8],
) -> Result<Option<Record>> {
    for record in tx.scan_by_key(key, 0) {
        let record = record?;
        if record.value.as_ref() == value {
            return Ok(Some(record));
        }
    }
    Ok(None)
}
