//! Event sink that writes to the tracing log

use crate::traits::{CoordinatorEvent, EventSink, UserNotice};

/// For hosts without analytics or crash reporting wired up
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn report(&self, event: CoordinatorEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|e| format!("<unencodable: {e}>"));
        match event {
            CoordinatorEvent::RescheduleFailed { .. } | CoordinatorEvent::Unexpected { .. } => {
                tracing::error!(event = %payload, "Reminder coordinator error");
            }
            CoordinatorEvent::PermissionRevoked { .. } => {
                tracing::warn!(event = %payload, "Reminder coordinator event");
            }
            CoordinatorEvent::Rescheduled { .. } => {
                tracing::info!(event = %payload, "Reminder coordinator event");
            }
        }
    }

    fn notify_user(&self, notice: UserNotice) {
        tracing::info!(?notice, "User notice requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TriggerReason;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_events_serialize_with_type_tag() {
        let at = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 10, 8, 0, 0)
            .unwrap();
        let event = CoordinatorEvent::RescheduleFailed {
            reason: TriggerReason::Midnight,
            error: "Timeout".to_string(),
            at,
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "reschedule_failed");
        assert_eq!(json["reason"], "midnight");
    }

    #[test]
    fn test_reporting_never_panics() {
        let sink = TracingEventSink;
        sink.notify_user(UserNotice::ScheduleNotFound);
        sink.report(CoordinatorEvent::PermissionRevoked {
            identity: "user-1".to_string(),
            at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2026, 3, 10, 8, 0, 0)
                .unwrap(),
        });
    }
}
