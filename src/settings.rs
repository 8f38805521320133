//! Coordinator tunables
//!
//! The delays here were tuned by feel rather than derived; each can be
//! overridden through the key-value store.

use std::time::Duration;

use crate::traits::KeyValueStore;

pub const DEBOUNCE_MS_KEY: &str = "reminders.debounce_ms";
pub const RETRY_BACKOFF_MS_KEY: &str = "reminders.retry_backoff_ms";
pub const PRECONDITION_RETRY_MS_KEY: &str = "reminders.precondition_retry_ms";
pub const MAX_PRECONDITION_RETRIES_KEY: &str = "reminders.max_precondition_retries";
pub const MIDNIGHT_SLICE_SECS_KEY: &str = "reminders.midnight_slice_secs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    /// Window in which reschedule requests coalesce into one run
    pub debounce: Duration,
    /// Pause before the single retry of a failed reschedule
    pub retry_backoff: Duration,
    /// Delay before re-checking when the session is not ready yet
    pub precondition_retry_delay: Duration,
    pub max_precondition_retries: u32,
    /// Longest single sleep of the midnight timer before it re-reads the clock
    pub midnight_poll_slice: Duration,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            retry_backoff: Duration::from_secs(3),
            precondition_retry_delay: Duration::from_secs(2),
            max_precondition_retries: 10,
            midnight_poll_slice: Duration::from_secs(60),
        }
    }
}

/// Read a strictly positive integer override; anything else means "use the default"
fn positive_override(store: &dyn KeyValueStore, key: &str) -> Option<u64> {
    match store.get_int(key) {
        Ok(Some(v)) if v > 0 => Some(v as u64),
        Ok(Some(v)) => {
            tracing::warn!(key = %key, value = v, "Ignoring non-positive reminder setting");
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Ignoring unreadable reminder setting");
            None
        }
    }
}

impl ReminderSettings {
    /// Defaults with any overrides found in `store`
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut settings = Self::default();

        if let Some(ms) = positive_override(store, DEBOUNCE_MS_KEY) {
            settings.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = positive_override(store, RETRY_BACKOFF_MS_KEY) {
            settings.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = positive_override(store, PRECONDITION_RETRY_MS_KEY) {
            settings.precondition_retry_delay = Duration::from_millis(ms);
        }
        if let Some(n) = positive_override(store, MAX_PRECONDITION_RETRIES_KEY) {
            settings.max_precondition_retries = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(secs) = positive_override(store, MIDNIGHT_SLICE_SECS_KEY) {
            settings.midnight_poll_slice = Duration::from_secs(secs);
        }

        tracing::debug!(?settings, "Loaded reminder settings");
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::InMemoryKeyValueStore;
    use crate::traits::{MockKeyValueStore, StoreError};

    #[test]
    fn test_empty_store_gives_defaults() {
        let store = InMemoryKeyValueStore::new();

        assert_eq!(ReminderSettings::load(&store), ReminderSettings::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let store = InMemoryKeyValueStore::new();
        store.set_int(DEBOUNCE_MS_KEY, 750).unwrap();
        store.set_int(RETRY_BACKOFF_MS_KEY, 10_000).unwrap();
        store.set_int(MAX_PRECONDITION_RETRIES_KEY, 3).unwrap();
        store.set_int(MIDNIGHT_SLICE_SECS_KEY, 15).unwrap();

        let settings = ReminderSettings::load(&store);

        assert_eq!(settings.debounce, Duration::from_millis(750));
        assert_eq!(settings.retry_backoff, Duration::from_secs(10));
        assert_eq!(settings.max_precondition_retries, 3);
        assert_eq!(settings.midnight_poll_slice, Duration::from_secs(15));
        assert_eq!(
            settings.precondition_retry_delay,
            ReminderSettings::default().precondition_retry_delay
        );
    }

    #[test]
    fn test_non_positive_overrides_are_ignored() {
        let store = InMemoryKeyValueStore::new();
        store.set_int(DEBOUNCE_MS_KEY, 0).unwrap();
        store.set_int(RETRY_BACKOFF_MS_KEY, -5).unwrap();

        assert_eq!(ReminderSettings::load(&store), ReminderSettings::default());
    }

    #[test]
    fn test_store_errors_fall_back_to_defaults() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_int()
            .returning(|_| Err(StoreError::Poisoned));

        assert_eq!(ReminderSettings::load(&store), ReminderSettings::default());
    }
}
