//! SQLite-backed log of MMCFE sweep results, one row per alpha step.
//!
//! On open, if `LogEntries` already holds rows, the last row's
//! `ParamState` blob is handed back so the caller can resume the sweep
//! from wherever it left off instead of restarting at `AlphaMin`.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::EngineResult;

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS LogEntries (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    TimeStamp TEXT NOT NULL,
    Lattice BLOB NOT NULL,
    Histogram BLOB NOT NULL,
    ParamState BLOB NOT NULL,
    Alpha REAL NOT NULL
)";

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub lattice: Vec<u8>,
    pub histogram: Vec<u8>,
    pub param_state: Vec<u8>,
    pub alpha: f64,
}

pub struct LogDb {
    conn: Connection,
}

impl LogDb {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(LogDb { conn })
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(LogDb { conn })
    }

    /// Row blob size limit the original log database enforces (SQLite
    /// blobs are bound through a 32-bit length parameter).
    pub fn insert_entry(&self, alpha: f64, lattice: &[u8], histogram: &[u8], param_state: &[u8]) -> EngineResult<i64> {
        for blob in [lattice, histogram, param_state] {
            if blob.len() > i32::MAX as usize {
                return Err(crate::error::EngineError::BufferOverflow {
                    attempted: blob.len(),
                    capacity: i32::MAX as usize,
                });
            }
        }
        self.conn.execute(
            "INSERT INTO LogEntries (TimeStamp, Lattice, Histogram, ParamState, Alpha) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![iso8601_utc_now(), lattice, histogram, param_state, alpha],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recently inserted entry, or `None` if the table is empty.
    /// Uses `ORDER BY Id DESC LIMIT 1` rather than a `TOP`-style clause,
    /// which SQLite does not support.
    pub fn latest_entry(&self) -> EngineResult<Option<LogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT Id, TimeStamp, Lattice, Histogram, ParamState, Alpha FROM LogEntries ORDER BY Id DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Some(LogEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                lattice: row.get(2)?,
                histogram: row.get(3)?,
                param_state: row.get(4)?,
                alpha: row.get(5)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// The `ParamState` blob of the last row, if any — the resume
    /// contract a fresh routine run checks before falling back to its
    /// own configuration.
    pub fn resume_param_state(&self) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.latest_entry()?.map(|entry| entry.param_state))
    }

    pub fn entry_count(&self) -> EngineResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM LogEntries", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Current UTC time formatted as ISO-8601 (`YYYY-MM-DDTHH:MM:SSZ`),
/// computed from `SystemTime` with Howard Hinnant's civil-from-days
/// algorithm rather than pulling in a date/time crate for one field.
fn iso8601_utc_now() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let total_secs = since_epoch.as_secs();
    let days = (total_secs / 86_400) as i64;
    let secs_of_day = total_secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Days-since-epoch to (year, month, day), per Howard Hinnant's
/// `civil_from_days`: https://howardhinnant.github.io/date_algorithms.html
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_latest_round_trips() {
        let db = LogDb::open_in_memory().unwrap();
        db.insert_entry(0.0, &[9, 9], &[1, 2, 3], &[7]).unwrap();
        db.insert_entry(0.1, &[9, 9], &[4, 5, 6], &[8]).unwrap();
        let latest = db.latest_entry().unwrap().unwrap();
        assert_eq!(latest.alpha, 0.1);
        assert_eq!(latest.histogram, vec![4, 5, 6]);
        assert_eq!(latest.param_state, vec![8]);
        assert_eq!(db.entry_count().unwrap(), 2);
    }

    #[test]
    fn latest_on_empty_table_is_none() {
        let db = LogDb::open_in_memory().unwrap();
        assert!(db.latest_entry().unwrap().is_none());
    }

    #[test]
    fn resume_param_state_reflects_the_last_inserted_row() {
        let db = LogDb::open_in_memory().unwrap();
        assert!(db.resume_param_state().unwrap().is_none());
        db.insert_entry(0.3, &[], &[], &[1, 2, 3, 4]).unwrap();
        assert_eq!(db.resume_param_state().unwrap(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn reopening_an_existing_database_preserves_its_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mmcfe.db");
        {
            let db = LogDb::open(&path).unwrap();
            db.insert_entry(0.5, &[1], &[2], &[3]).unwrap();
        }
        let reopened = LogDb::open(&path).unwrap();
        assert_eq!(reopened.entry_count().unwrap(), 1);
        assert_eq!(reopened.resume_param_state().unwrap(), Some(vec![3]));
    }

    #[test]
    fn civil_from_days_matches_a_known_epoch_date() {
        // 2024-01-01 is 19723 days after 1970-01-01.
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }

    #[test]
    fn timestamp_is_a_well_formed_iso8601_string() {
        let ts = iso8601_utc_now();
        assert_eq!(ts.len(), 20);
        assert_eq!(ts.as_bytes()[4], b'-');
        assert_eq!(ts.as_bytes()[10], b'T');
        assert_eq!(ts.as_bytes()[19], b'Z');
    }
}
