//! Test doubles for dependency injection
//!
//! In-memory implementations of every collaborator, for isolated testing.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::coordinator::CoordinatorDeps;
use crate::traits::{
    Clock, CoordinatorEvent, DayIndexStore, EventSink, KeyValueStore, NotificationError,
    NotificationSink, PermissionQuery, PermissionStatus, ScheduleProvider, ScheduleSnapshot,
    ScheduledReminder, SessionSnapshot, SessionState, StoreError, UserNotice,
};

// ============================================================================
// InMemoryKeyValueStore
// ============================================================================

/// In-memory key-value store. Integers are stored as their decimal text,
/// like the SQLite store does.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store with pre-populated entries
    pub fn with_entries(entries: Vec<(&str, &str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            store: Arc::new(Mutex::new(map)),
        }
    }

    /// Get all stored keys (for assertions)
    pub fn keys(&self) -> Vec<String> {
        self.store.lock().unwrap().keys().cloned().collect()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        match self.get_string(key)? {
            Some(value) => value
                .parse()
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

// ============================================================================
// InMemoryDayIndex
// ============================================================================

/// In-memory delivery bookkeeping that also records every clear call
#[derive(Clone, Default)]
pub struct InMemoryDayIndex {
    records: Arc<Mutex<BTreeSet<(String, String, NaiveDate)>>>,
    cleared_dates: Arc<Mutex<Vec<(String, NaiveDate)>>>,
    yesterday_clears: Arc<Mutex<Vec<NaiveDate>>>,
}

impl InMemoryDayIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self, identity: &str, reminder_id: &str, date: NaiveDate) {
        self.records
            .lock()
            .unwrap()
            .insert((identity.to_string(), reminder_id.to_string(), date));
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Arguments of every `clear_for_date` call, in order
    pub fn cleared_dates(&self) -> Vec<(String, NaiveDate)> {
        self.cleared_dates.lock().unwrap().clone()
    }

    /// `today` of every `clear_all_for_yesterday` call, in order
    pub fn yesterday_clears(&self) -> Vec<NaiveDate> {
        self.yesterday_clears.lock().unwrap().clone()
    }
}

impl DayIndexStore for InMemoryDayIndex {
    fn clear_for_date(&self, identity: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap()
            .retain(|(id, _, d)| !(id == identity && *d == date));
        self.cleared_dates
            .lock()
            .unwrap()
            .push((identity.to_string(), date));
        Ok(())
    }

    fn clear_all_for_yesterday(&self, today: NaiveDate) -> Result<(), StoreError> {
        self.records.lock().unwrap().retain(|(_, _, d)| *d >= today);
        self.yesterday_clears.lock().unwrap().push(today);
        Ok(())
    }
}

// ============================================================================
// RecordedNotificationSink
// ============================================================================

/// Failure configuration for `schedule_all`
#[derive(Debug, Clone)]
pub enum SinkBehavior {
    AlwaysSucceed,
    /// Fail N times, then succeed
    FailThenSucceed {
        fail_count: usize,
        error: NotificationError,
    },
    AlwaysFail(NotificationError),
}

/// Recorded notification sink for testing
///
/// Records every call, fails according to [`SinkBehavior`], can simulate a
/// slow platform, and tracks how many `schedule_all` calls overlapped.
/// `cancel_all` only fails under `AlwaysFail`.
#[derive(Clone)]
pub struct RecordedNotificationSink {
    schedules: Arc<Mutex<Vec<ScheduleSnapshot>>>,
    cancel_count: Arc<AtomicUsize>,
    behavior: Arc<Mutex<SinkBehavior>>,
    delay: Arc<Mutex<Duration>>,
    active: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
}

impl RecordedNotificationSink {
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(Mutex::new(Vec::new())),
            cancel_count: Arc::new(AtomicUsize::new(0)),
            behavior: Arc::new(Mutex::new(SinkBehavior::AlwaysSucceed)),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            active: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn success() -> Self {
        Self::new()
    }

    pub fn fail_then_succeed(fail_count: usize, error: NotificationError) -> Self {
        let sink = Self::new();
        sink.set_behavior(SinkBehavior::FailThenSucceed { fail_count, error });
        sink
    }

    pub fn always_fail(error: NotificationError) -> Self {
        let sink = Self::new();
        sink.set_behavior(SinkBehavior::AlwaysFail(error));
        sink
    }

    pub fn set_behavior(&self, behavior: SinkBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Make every `schedule_all` call take `delay` (tokio time)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.lock().unwrap().len()
    }

    /// Snapshots passed to `schedule_all`, in call order
    pub fn scheduled(&self) -> Vec<ScheduleSnapshot> {
        self.schedules.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Largest number of `schedule_all` calls that were running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl Default for RecordedNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for RecordedNotificationSink {
    async fn cancel_all(&self) -> Result<(), NotificationError> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            SinkBehavior::AlwaysFail(error) => Err(error),
            _ => Ok(()),
        }
    }

    async fn schedule_all(&self, snapshot: &ScheduleSnapshot) -> Result<(), NotificationError> {
        let current_count = {
            let mut schedules = self.schedules.lock().unwrap();
            schedules.push(snapshot.clone());
            schedules.len()
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            SinkBehavior::AlwaysSucceed => Ok(()),
            SinkBehavior::FailThenSucceed { fail_count, error } => {
                if current_count <= fail_count {
                    Err(error)
                } else {
                    Ok(())
                }
            }
            SinkBehavior::AlwaysFail(error) => Err(error),
        }
    }
}

// ============================================================================
// Static providers
// ============================================================================

/// Schedule provider returning whatever the test last set
#[derive(Clone, Default)]
pub struct StaticScheduleProvider {
    snapshot: Arc<Mutex<Option<ScheduleSnapshot>>>,
}

impl StaticScheduleProvider {
    /// Provider with no schedule loaded
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ScheduleSnapshot) -> Self {
        let provider = Self::default();
        provider.set(Some(snapshot));
        provider
    }

    pub fn set(&self, snapshot: Option<ScheduleSnapshot>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl ScheduleProvider for StaticScheduleProvider {
    fn current_schedule(&self) -> Option<ScheduleSnapshot> {
        self.snapshot.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct StaticSession {
    snapshot: Arc<Mutex<SessionSnapshot>>,
}

impl StaticSession {
    /// Signed out, nothing loaded
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Signed in as `identity` with setup done and the cat profile loaded
    pub fn ready(identity: &str) -> Self {
        let session = Self::default();
        session.set(SessionSnapshot {
            identity: Some(identity.to_string()),
            setup_complete: true,
            primary_entity_present: true,
        });
        session
    }

    pub fn set(&self, snapshot: SessionSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl SessionState for StaticSession {
    fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct StaticPermission {
    status: Arc<Mutex<PermissionStatus>>,
}

impl StaticPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn set(&self, status: PermissionStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl PermissionQuery for StaticPermission {
    async fn current_status(&self) -> PermissionStatus {
        *self.status.lock().unwrap()
    }
}

// ============================================================================
// RecordingEventSink
// ============================================================================

#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<CoordinatorEvent>>>,
    notices: Arc<Mutex<Vec<UserNotice>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CoordinatorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<UserNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<CoordinatorEvent> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    CoordinatorEvent::RescheduleFailed { .. } | CoordinatorEvent::Unexpected { .. }
                )
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn report(&self, event: CoordinatorEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn notify_user(&self, notice: UserNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// Wall clock that follows tokio's clock from an anchor.
///
/// Under `tokio::time::pause()` the wall clock moves exactly as far as tokio's
/// auto-advance does. `advance` and `set_offset_minutes` move the wall clock
/// alone, which is how a device suspension or a timezone change looks to
/// the coordinator.
pub struct ManualClock {
    base: Mutex<(DateTime<FixedOffset>, tokio::time::Instant)>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            base: Mutex::new((start, tokio::time::Instant::now())),
        }
    }

    /// Local wall time `y-m-d h:min:00` at `offset_minutes` east of UTC
    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap();
        Self::new(offset.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.base.lock().unwrap() = (now, tokio::time::Instant::now());
    }

    /// Jump the wall clock forward without tokio time passing
    pub fn advance(&self, by: Duration) {
        let now = self.now();
        self.set(now + chrono::Duration::from_std(by).unwrap());
    }

    /// Same instant, new UTC offset
    pub fn set_offset_minutes(&self, offset_minutes: i32) {
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap();
        let now = self.now().with_timezone(&offset);
        self.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let (anchor, at) = *self.base.lock().unwrap();
        anchor + chrono::Duration::from_std(at.elapsed()).unwrap()
    }
}

// ============================================================================
// MockEnvironment
// ============================================================================

/// A one-reminder schedule (insulin at 08:00)
pub fn sample_schedule() -> ScheduleSnapshot {
    ScheduleSnapshot::new(vec![ScheduledReminder {
        id: "insulin-am".to_string(),
        treatment_id: "insulin".to_string(),
        time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
    }])
}

/// Every collaborator as a test double, kept typed so tests can drive and
/// inspect them
pub struct MockEnvironment {
    pub schedule: Arc<StaticScheduleProvider>,
    pub sink: Arc<RecordedNotificationSink>,
    pub day_index: Arc<InMemoryDayIndex>,
    pub store: Arc<InMemoryKeyValueStore>,
    pub permission: Arc<StaticPermission>,
    pub events: Arc<RecordingEventSink>,
    pub session: Arc<StaticSession>,
    pub clock: Arc<ManualClock>,
}

impl MockEnvironment {
    /// Signed in as `user-1`, setup done, schedule loaded, permission granted
    pub fn ready(clock: ManualClock) -> Self {
        Self {
            schedule: Arc::new(StaticScheduleProvider::with_snapshot(sample_schedule())),
            sink: Arc::new(RecordedNotificationSink::success()),
            day_index: Arc::new(InMemoryDayIndex::new()),
            store: Arc::new(InMemoryKeyValueStore::new()),
            permission: Arc::new(StaticPermission::new(PermissionStatus::Granted)),
            events: Arc::new(RecordingEventSink::new()),
            session: Arc::new(StaticSession::ready("user-1")),
            clock: Arc::new(clock),
        }
    }

    pub fn deps(&self) -> CoordinatorDeps {
        CoordinatorDeps {
            schedule: self.schedule.clone(),
            sink: self.sink.clone(),
            day_index: self.day_index.clone(),
            store: self.store.clone(),
            permission: self.permission.clone(),
            events: self.events.clone(),
            session: self.session.clone(),
            clock: self.clock.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ScheduleSnapshot {
        ScheduleSnapshot::new(vec![ScheduledReminder {
            id: "rem-1".to_string(),
            treatment_id: "fluids".to_string(),
            time_of_day: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
        }])
    }

    #[test]
    fn test_key_value_store() {
        let store = InMemoryKeyValueStore::with_entries(vec![("a", "1")]);

        assert_eq!(store.get_int("a").unwrap(), Some(1));
        store.set_string("b", "x").unwrap();
        assert!(store.get_int("b").is_err());
        assert_eq!(store.keys().len(), 2);
    }

    #[test]
    fn test_day_index_clear_semantics() {
        let index = InMemoryDayIndex::new();
        let d9 = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let d10 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        index.record_delivered("u", "r1", d9);
        index.record_delivered("u", "r1", d10);
        index.record_delivered("v", "r1", d10);

        index.clear_all_for_yesterday(d10).unwrap();
        assert_eq!(index.record_count(), 2);

        index.clear_for_date("u", d10).unwrap();
        assert_eq!(index.record_count(), 1);
        assert_eq!(index.yesterday_clears(), vec![d10]);
        assert_eq!(index.cleared_dates(), vec![("u".to_string(), d10)]);
    }

    #[tokio::test]
    async fn test_sink_fail_then_succeed() {
        let sink = RecordedNotificationSink::fail_then_succeed(
            2,
            NotificationError::Platform("busy".to_string()),
        );

        assert!(sink.schedule_all(&snapshot()).await.is_err());
        assert!(sink.schedule_all(&snapshot()).await.is_err());
        assert!(sink.schedule_all(&snapshot()).await.is_ok());

        assert_eq!(sink.schedule_count(), 3);
        assert_eq!(sink.scheduled()[0], snapshot());
        assert!(sink.cancel_all().await.is_ok());
        assert_eq!(sink.cancel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_tracks_overlapping_calls() {
        let sink = Arc::new(RecordedNotificationSink::success());
        sink.set_delay(Duration::from_secs(1));

        let a = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.schedule_all(&snapshot()).await })
        };
        let b = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.schedule_all(&snapshot()).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(sink.max_concurrent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_clock_follows_tokio_time() {
        let clock = ManualClock::at(2026, 3, 10, 23, 59, 60);

        tokio::time::sleep(Duration::from_secs(90)).await;

        let now = clock.now();
        assert_eq!(now.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(now.offset().local_minus_utc(), 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_clock_offset_change_keeps_instant() {
        let clock = ManualClock::at(2026, 3, 10, 12, 0, 60);
        let before = clock.now();

        clock.set_offset_minutes(120);

        let after = clock.now();
        assert_eq!(before.timestamp(), after.timestamp());
        assert_eq!(after.offset().local_minus_utc(), 7200);
    }
}
