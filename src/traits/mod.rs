//! Trait definitions for dependency injection
//!
//! Every collaborator the coordinator talks to sits behind one of these traits
//! so the host can plug in platform implementations and tests can plug in
//! in-memory ones.

mod clock;
mod day_index;
mod event_sink;
mod key_value_store;
mod notification_sink;
mod permission;
mod schedule_provider;
mod session;

pub use clock::Clock;
pub use day_index::DayIndexStore;
pub use event_sink::{CoordinatorEvent, EventSink, UserNotice};
pub use key_value_store::{KeyValueStore, StoreError};
pub use notification_sink::{NotificationError, NotificationSink};
pub use permission::{PermissionQuery, PermissionStatus};
pub use schedule_provider::{ScheduleProvider, ScheduleSnapshot, ScheduledReminder};
pub use session::{SessionSnapshot, SessionState};

#[cfg(test)]
pub use day_index::MockDayIndexStore;
#[cfg(test)]
pub use key_value_store::MockKeyValueStore;
