//! Durable record of the last successful full reschedule

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;
use crate::traits::KeyValueStore;

/// Both fields live in one JSON value under this key, so a checkpoint is
/// either fully written or absent.
pub const CHECKPOINT_KEY: &str = "reminders.last_checkpoint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCheckpoint {
    pub last_run_date: NaiveDate,
    pub last_tz_offset_minutes: i32,
}

pub struct CheckpointStore {
    store: Arc<dyn KeyValueStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the checkpoint. Any read or decode failure is a cold start.
    pub fn load(&self) -> Option<SchedulerCheckpoint> {
        let raw = match self.store.get_string(CHECKPOINT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("No reminder checkpoint, cold start");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read reminder checkpoint, treating as cold start");
                return None;
            }
        };

        match serde_json::from_str::<SchedulerCheckpoint>(&raw) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt reminder checkpoint, treating as cold start");
                None
            }
        }
    }

    pub fn save(
        &self,
        date: NaiveDate,
        tz_offset_minutes: i32,
    ) -> Result<SchedulerCheckpoint, CoordinatorError> {
        let checkpoint = SchedulerCheckpoint {
            last_run_date: date,
            last_tz_offset_minutes: tz_offset_minutes,
        };
        let encoded = serde_json::to_string(&checkpoint)?;
        self.store.set_string(CHECKPOINT_KEY, &encoded)?;
        tracing::debug!(%date, tz_offset_minutes, "Saved reminder checkpoint");
        Ok(checkpoint)
    }
}
