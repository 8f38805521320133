//! One-way analytics, error-reporting and UI sinks

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::executor::TriggerReason;

/// Something worth recording in analytics or crash reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    Rescheduled {
        reason: TriggerReason,
        reminder_count: usize,
        at: DateTime<FixedOffset>,
    },
    RescheduleFailed {
        reason: TriggerReason,
        error: String,
        at: DateTime<FixedOffset>,
    },
    PermissionRevoked {
        identity: String,
        at: DateTime<FixedOffset>,
    },
    Unexpected {
        reason: TriggerReason,
        message: String,
        at: DateTime<FixedOffset>,
    },
}

/// Explanations the host should show the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserNotice {
    PermissionRevoked,
    ScheduleNotFound,
}

/// Fire-and-forget reporting. Implementations swallow their own failures.
pub trait EventSink: Send + Sync {
    fn report(&self, event: CoordinatorEvent);

    fn notify_user(&self, notice: UserNotice);
}
