//! Crate-level error type

use thiserror::Error;

use crate::traits::{NotificationError, StoreError};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
    #[error("Checkpoint encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Reschedule task failed: {0}")]
    Task(String),
}
