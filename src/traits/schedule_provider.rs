//! Treatment schedule snapshot provider

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// One reminder the platform should deliver every day at `time_of_day`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: String,
    pub treatment_id: String,
    pub time_of_day: NaiveTime,
}

/// The complete desired reminder set at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub reminders: Vec<ScheduledReminder>,
}

impl ScheduleSnapshot {
    pub fn new(reminders: Vec<ScheduledReminder>) -> Self {
        Self { reminders }
    }

    pub fn len(&self) -> usize {
        self.reminders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reminders.is_empty()
    }
}

/// Read-only access to the host's cached treatment schedule.
///
/// Returns `None` while the schedule has not been loaded yet.
pub trait ScheduleProvider: Send + Sync {
    fn current_schedule(&self) -> Option<ScheduleSnapshot>;
}
