//! SQLite-backed key-value store for coordinator state and settings

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::traits::{KeyValueStore, StoreError};

pub struct AppConfig {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

impl AppConfig {
    fn init_table(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(db_err)
    }

    /// Open or create the config database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(db_err)?;
        Self::init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open standalone in-memory config (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init_table(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    #[cfg(test)]
    pub(crate) fn busy_timeout_ms(&self) -> Result<i64, StoreError> {
        self.conn()?
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .map_err(db_err)
    }
}

impl KeyValueStore for AppConfig {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT value FROM app_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        let ret = match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        };
        tracing::debug!(key = %key, found = ret.as_ref().ok().and_then(|v| v.as_ref()).is_some(), "Config get");
        ret
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tracing::debug!(key = %key, "Config set");
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO app_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, now],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        match self.get_string(key)? {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| StoreError::InvalidValue {
                    key: key.to_string(),
                    value,
                }),
            None => Ok(None),
        }
    }

    fn set_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.set_string(key, &value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let config = AppConfig::open_in_memory().unwrap();

        config.set_string("reminders.last_checkpoint", "{}").unwrap();
        let value = config.get_string("reminders.last_checkpoint").unwrap();

        assert_eq!(value, Some("{}".to_string()));
    }

    #[test]
    fn test_get_missing_key() {
        let config = AppConfig::open_in_memory().unwrap();

        assert_eq!(config.get_string("nonexistent_key").unwrap(), None);
        assert_eq!(config.get_int("nonexistent_key").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let config = AppConfig::open_in_memory().unwrap();

        config.set_string("key", "original").unwrap();
        config.set_string("key", "updated").unwrap();

        assert_eq!(config.get_string("key").unwrap(), Some("updated".to_string()));
    }

    #[test]
    fn test_int_round_trip_and_negative_values() {
        let config = AppConfig::open_in_memory().unwrap();

        tokio_test::assert_ok!(config.set_int("offset", -300));

        assert_eq!(config.get_int("offset").unwrap(), Some(-300));
    }

    #[test]
    fn test_get_int_rejects_non_numeric() {
        let config = AppConfig::open_in_memory().unwrap();
        config.set_string("offset", "soon").unwrap();

        match config.get_int("offset") {
            Err(StoreError::InvalidValue { key, value }) => {
                assert_eq!(key, "offset");
                assert_eq!(value, "soon");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_open_on_disk_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reminders.db");

        {
            let config = AppConfig::open(&path).unwrap();
            config.set_int("reminders.debounce_ms", 500).unwrap();
        }

        let reopened = AppConfig::open(&path).unwrap();
        assert_eq!(reopened.get_int("reminders.debounce_ms").unwrap(), Some(500));
    }
}
