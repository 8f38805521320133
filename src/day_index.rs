//! SQLite-backed per-day delivery bookkeeping
//!
//! The host's delivery path records each reminder it shows for a date so a
//! reschedule later that day does not show it again. The coordinator only ever
//! clears records; it never reads them.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::traits::{DayIndexStore, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS delivered_reminders (
        identity TEXT NOT NULL,
        reminder_id TEXT NOT NULL,
        date TEXT NOT NULL,
        delivered_at INTEGER NOT NULL,
        PRIMARY KEY (identity, reminder_id, date)
    );

    CREATE INDEX IF NOT EXISTS idx_delivered_date
        ON delivered_reminders (date);";

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub struct DayIndex {
    conn: Mutex<Connection>,
}

impl DayIndex {
    /// Open or create the index database
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Record that `reminder_id` was shown to `identity` on `date`.
    /// Recording the same delivery twice is a no-op.
    pub fn record_delivered(
        &self,
        identity: &str,
        reminder_id: &str,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO delivered_reminders (identity, reminder_id, date, delivered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![identity, reminder_id, date_key(date), now],
        )
        .map_err(db_err)?;
        tracing::debug!(identity = %identity, reminder_id = %reminder_id, %date, "Recorded delivery");
        Ok(())
    }

    pub fn was_delivered(
        &self,
        identity: &str,
        reminder_id: &str,
        date: NaiveDate,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM delivered_reminders
                 WHERE identity = ?1 AND reminder_id = ?2 AND date = ?3",
                params![identity, reminder_id, date_key(date)],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Total number of records (diagnostics)
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM delivered_reminders", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

impl DayIndexStore for DayIndex {
    fn clear_for_date(&self, identity: &str, date: NaiveDate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM delivered_reminders WHERE identity = ?1 AND date = ?2",
                params![identity, date_key(date)],
            )
            .map_err(db_err)?;
        tracing::debug!(identity = %identity, %date, removed, "Cleared day index for date");
        Ok(())
    }

    fn clear_all_for_yesterday(&self, today: NaiveDate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // ISO dates sort lexicographically
        let removed = conn
            .execute(
                "DELETE FROM delivered_reminders WHERE date < ?1",
                params![date_key(today)],
            )
            .map_err(db_err)?;
        if removed > 0 {
            tracing::info!(removed, %today, "Cleared stale day index records");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_record_and_query() {
        let index = DayIndex::open_in_memory().unwrap();

        index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();

        assert!(index.was_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap());
        assert!(!index.was_delivered("user-1", "rem-am", date(2026, 3, 11)).unwrap());
        assert!(!index.was_delivered("user-2", "rem-am", date(2026, 3, 10)).unwrap());
    }

    #[test]
    fn test_duplicate_record_is_ignored() {
        let index = DayIndex::open_in_memory().unwrap();

        index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();

        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_clear_for_date_only_touches_that_identity_and_date() {
        let index = DayIndex::open_in_memory().unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();
        index.record_delivered("user-1", "rem-pm", date(2026, 3, 10)).unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 3, 9)).unwrap();
        index.record_delivered("user-2", "rem-am", date(2026, 3, 10)).unwrap();

        index.clear_for_date("user-1", date(2026, 3, 10)).unwrap();

        assert_eq!(index.count().unwrap(), 2);
        assert!(index.was_delivered("user-1", "rem-am", date(2026, 3, 9)).unwrap());
        assert!(index.was_delivered("user-2", "rem-am", date(2026, 3, 10)).unwrap());
    }

    #[test]
    fn test_clear_all_for_yesterday_removes_every_older_day() {
        let index = DayIndex::open_in_memory().unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 2, 28)).unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 3, 9)).unwrap();
        index.record_delivered("user-2", "rem-pm", date(2026, 3, 9)).unwrap();
        index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();

        index.clear_all_for_yesterday(date(2026, 3, 10)).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert!(index.was_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap());
    }

    #[test]
    fn test_clearing_an_empty_index_is_ok() {
        let index = DayIndex::open_in_memory().unwrap();

        index.clear_all_for_yesterday(date(2026, 3, 10)).unwrap();
        index.clear_for_date("user-1", date(2026, 3, 10)).unwrap();

        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day_index.db");

        {
            let index = DayIndex::open(&path).unwrap();
            index.record_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap();
        }

        let reopened = DayIndex::open(&path).unwrap();
        assert!(reopened.was_delivered("user-1", "rem-am", date(2026, 3, 10)).unwrap());
    }
}
