//! Key-value persistence trait

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Trait for small persistent settings and coordinator state
///
/// Production: SQLite `app_config` table
/// Testing: In-memory HashMap
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    fn set_int(&self, key: &str, value: i64) -> Result<(), StoreError>;
}
