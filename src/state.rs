//! Production wiring

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::coordinator::{spawn_coordinator, CoordinatorDeps, CoordinatorHandle};
use crate::day_index::DayIndex;
use crate::permission_monitor;
use crate::production::{SystemClock, TracingEventSink};
use crate::traits::{
    EventSink, NotificationSink, PermissionQuery, ScheduleProvider, SessionState, StoreError,
};

/// Platform bridges only the host can provide
pub struct HostAdapters {
    pub schedule: Arc<dyn ScheduleProvider>,
    pub sink: Arc<dyn NotificationSink>,
    pub permission: Arc<dyn PermissionQuery>,
    pub session: Arc<dyn SessionState>,
    /// Falls back to [`TracingEventSink`] when the host has no analytics
    pub events: Option<Arc<dyn EventSink>>,
}

/// Reminder state containing all dependencies
pub struct ReminderState {
    pub config: Arc<AppConfig>,
    pub day_index: Arc<DayIndex>,
    pub deps: CoordinatorDeps,
}

impl ReminderState {
    /// Open the SQLite stores under `data_dir` and combine them with the host's adapters
    pub fn new_production(
        data_dir: &Path,
        host: HostAdapters,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("Initializing ReminderState");
        std::fs::create_dir_all(data_dir)?;

        let index_path = data_dir.join("day_index.sqlite");
        tracing::info!(path = %index_path.display(), "Opening day index");
        let day_index = Arc::new(DayIndex::open(&index_path)?);

        let config_path = data_dir.join("config.sqlite");
        tracing::info!(path = %config_path.display(), "Opening config database");
        let config = Arc::new(AppConfig::open(&config_path)?);

        let events = host.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        let deps = CoordinatorDeps {
            schedule: host.schedule,
            sink: host.sink,
            day_index: day_index.clone(),
            store: config.clone(),
            permission: host.permission,
            events,
            session: host.session,
            clock: Arc::new(SystemClock),
        };

        Ok(Self {
            config,
            day_index,
            deps,
        })
    }

    /// Spawn the coordinator on the current tokio runtime
    pub fn start(&self) -> CoordinatorHandle {
        spawn_coordinator(self.deps.clone())
    }

    /// Record the user turning reminders on or off
    pub fn record_notification_intent(
        &self,
        identity: &str,
        enabled: bool,
    ) -> Result<(), StoreError> {
        permission_monitor::record_intent(&*self.config, identity, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{
        RecordedNotificationSink, StaticPermission, StaticScheduleProvider, StaticSession,
    };
    use crate::traits::{KeyValueStore, PermissionStatus};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn host() -> HostAdapters {
        HostAdapters {
            schedule: Arc::new(StaticScheduleProvider::empty()),
            sink: Arc::new(RecordedNotificationSink::success()),
            permission: Arc::new(StaticPermission::new(PermissionStatus::Granted)),
            session: Arc::new(StaticSession::signed_out()),
            events: None,
        }
    }

    #[test]
    fn test_new_production_creates_databases() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("reminders");

        let state = ReminderState::new_production(&data_dir, host()).unwrap();

        assert!(data_dir.join("config.sqlite").exists());
        assert!(data_dir.join("day_index.sqlite").exists());
        assert_eq!(state.day_index.count().unwrap(), 0);
        assert_eq!(state.config.busy_timeout_ms().unwrap(), 5000);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();

        {
            let state = ReminderState::new_production(dir.path(), host()).unwrap();
            state.record_notification_intent("user-1", true).unwrap();
            state
                .day_index
                .record_delivered("user-1", "insulin-am", date)
                .unwrap();
        }

        let state = ReminderState::new_production(dir.path(), host()).unwrap();
        assert_eq!(
            state
                .config
                .get_string(&permission_monitor::intent_key("user-1"))
                .unwrap(),
            Some("enabled".to_string())
        );
        assert!(state
            .day_index
            .was_delivered("user-1", "insulin-am", date)
            .unwrap());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let state = ReminderState::new_production(dir.path(), host()).unwrap();

        let handle = state.start();
        handle.on_startup();
        handle.shutdown().await;
    }
}
