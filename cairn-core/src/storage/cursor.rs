use super::record_table::{RECORD_COLUMNS, query_records};
use crate::error::Result;
use crate::record::{Record, RecordKey, Timestamp};
use rusqlite::{Connection, params};
use std::collections::VecDeque;

/// Which index a cursor walks.
#[derive(Debug, Clone)]
pub(crate) enum IndexScan {
    /// Whole table in uid order.
    All,
    /// by-key, uid order within the key.
    ByKey(RecordKey),
    /// by-anonymity-and-type, uid order within the pair.
    ByAnonymityAndType { anonymity: u32, record_type: u32 },
    /// by-expiry ascending, strictly before the bound.
    ExpiringBefore(Timestamp),
}

#[derive(Debug, Clone, Copy)]
enum Position {
    /// Lowest uid the next page may return.
    UidFloor(i64),
    /// Last `(expiry, uid)` handed out.
    ExpiryAfter { expiry: i64, uid: i64 },
}

/// Lazy walk over one index inside a transaction.
///
/// Rows are pulled in pages of `batch_size` using keyset pagination, so a
/// caller that stops early never materializes the rest of the index.
pub struct RecordCursor<'t> {
    conn: &'t Connection,
    scan: IndexScan,
    position: Position,
    page: VecDeque<Record>,
    batch_size: usize,
    exhausted: bool,
}

impl<'t> RecordCursor<'t> {
    pub(crate) fn new(
        conn: &'t Connection,
        scan: IndexScan,
        uid_floor: u64,
        batch_size: usize,
    ) -> Self {
        let position = match scan {
            IndexScan::ExpiringBefore(_) => Position::ExpiryAfter {
                expiry: i64::MIN,
                uid: -1,
            },
            _ => Position::UidFloor(uid_to_sql(uid_floor)),
        };

        Self {
            conn,
            scan,
            position,
            page: VecDeque::new(),
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let limit = self.batch_size as i64;

        let rows = match (&self.scan, self.position) {
            (IndexScan::All, Position::UidFloor(floor)) => query_records(
                self.conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE uid >= ?1
                     ORDER BY uid LIMIT ?2"
                ),
                params![floor, limit],
            )?,
            (IndexScan::ByKey(key), Position::UidFloor(floor)) => query_records(
                self.conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE key = ?1 AND uid >= ?2
                     ORDER BY uid LIMIT ?3"
                ),
                params![key.as_bytes().as_slice(), floor, limit],
            )?,
            (
                IndexScan::ByAnonymityAndType {
                    anonymity,
                    record_type,
                },
                Position::UidFloor(floor),
            ) => query_records(
                self.conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM records
                     WHERE anonymity = ?1 AND type = ?2 AND uid >= ?3
                     ORDER BY uid LIMIT ?4"
                ),
                params![anonymity, record_type, floor, limit],
            )?,
            (IndexScan::ExpiringBefore(before), Position::ExpiryAfter { expiry, uid }) => {
                query_records(
                    self.conn,
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM records
                         WHERE expiry < ?1
                           AND (expiry > ?2 OR (expiry = ?2 AND uid > ?3))
                         ORDER BY expiry, uid LIMIT ?4"
                    ),
                    params![before.as_micros(), expiry, uid, limit],
                )?
            }
            // Positions are chosen from the scan kind in `new`.
            _ => Vec::new(),
        };

        if (rows.len() as i64) < limit {
            self.exhausted = true;
        }

        if let Some(last) = rows.last() {
            self.position = match self.position {
                Position::UidFloor(_) => {
                    Position::UidFloor(uid_to_sql(last.uid).saturating_add(1))
                }
                Position::ExpiryAfter { .. } => Position::ExpiryAfter {
                    expiry: last.expiry.as_micros(),
                    uid: uid_to_sql(last.uid),
                },
            };
        }

        self.page.extend(rows);
        Ok(())
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }

        self.page.pop_front().map(Ok)
    }
}

fn uid_to_sql(uid: u64) -> i64 {
    i64::try_from(uid).unwrap_or(i64::MAX)
}
