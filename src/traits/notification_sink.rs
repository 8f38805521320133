//! Notification platform trait

use thiserror::Error;

use super::ScheduleSnapshot;

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Notifications not permitted")]
    NotPermitted,
    #[error("Timeout")]
    Timeout,
}

/// Trait for the OS notification scheduler
///
/// `schedule_all` is the full reschedule: the implementation cancels every
/// pending reminder and recreates the set from the snapshot.
///
/// Production: supplied by the host platform
/// Testing: Recorded calls with configurable failures
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Cancel every locally scheduled reminder
    async fn cancel_all(&self) -> Result<(), NotificationError>;

    /// Replace every locally scheduled reminder with the snapshot's contents
    async fn schedule_all(&self, snapshot: &ScheduleSnapshot) -> Result<(), NotificationError>;
}
