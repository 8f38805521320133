//! Detects notification permission revoked in system settings
//!
//! The user's intent is stored per identity. When the intent says "enabled" but
//! the OS no longer grants permission, every pending reminder is cancelled,
//! today's bookkeeping is cleared, and the user is told why once. The intent is
//! then rewritten to "disabled" so the cleanup does not repeat.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::error::CoordinatorError;
use crate::traits::{
    CoordinatorEvent, DayIndexStore, EventSink, KeyValueStore, NotificationSink,
    PermissionQuery, StoreError, UserNotice,
};

const INTENT_KEY_PREFIX: &str = "notifications.intent.";
const INTENT_ENABLED: &str = "enabled";
const INTENT_DISABLED: &str = "disabled";

pub fn intent_key(identity: &str) -> String {
    format!("{INTENT_KEY_PREFIX}{identity}")
}

/// Store the user's reminder preference for `identity`.
/// Hosts call this whenever the user toggles reminders.
pub fn record_intent(
    store: &dyn KeyValueStore,
    identity: &str,
    enabled: bool,
) -> Result<(), StoreError> {
    let value = if enabled { INTENT_ENABLED } else { INTENT_DISABLED };
    store.set_string(&intent_key(identity), value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationIntent {
    Enabled,
    Disabled,
}

/// Result of one revocation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationCheck {
    /// The user never expressed an intent
    NoIntent,
    NotEnabled,
    StillGranted,
    Revoked,
}

pub struct PermissionMonitor {
    store: Arc<dyn KeyValueStore>,
    permission: Arc<dyn PermissionQuery>,
    sink: Arc<dyn NotificationSink>,
    day_index: Arc<dyn DayIndexStore>,
    events: Arc<dyn EventSink>,
}

impl PermissionMonitor {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        permission: Arc<dyn PermissionQuery>,
        sink: Arc<dyn NotificationSink>,
        day_index: Arc<dyn DayIndexStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            permission,
            sink,
            day_index,
            events,
        }
    }

    pub fn record_intent(&self, identity: &str, enabled: bool) -> Result<(), StoreError> {
        record_intent(&*self.store, identity, enabled)
    }

    pub fn intent(&self, identity: &str) -> Option<NotificationIntent> {
        match self.store.get_string(&intent_key(identity)) {
            Ok(Some(v)) if v == INTENT_ENABLED => Some(NotificationIntent::Enabled),
            Ok(Some(v)) if v == INTENT_DISABLED => Some(NotificationIntent::Disabled),
            Ok(Some(v)) => {
                tracing::warn!(identity = %identity, value = %v, "Unknown notification intent");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Failed to read notification intent");
                None
            }
        }
    }

    /// Compare stored intent with the OS status and clean up on revocation.
    /// Never fails; cleanup errors are logged.
    pub async fn check(&self, identity: &str, now: &DateTime<FixedOffset>) -> RevocationCheck {
        match self.intent(identity) {
            None => RevocationCheck::NoIntent,
            Some(NotificationIntent::Disabled) => RevocationCheck::NotEnabled,
            Some(NotificationIntent::Enabled) => {
                let status = self.permission.current_status().await;
                if status.is_granted() {
                    return RevocationCheck::StillGranted;
                }

                tracing::info!(identity = %identity, ?status, "Notification permission revoked");
                if let Err(e) = self.handle_revocation(identity, now).await {
                    tracing::warn!(identity = %identity, error = %e, "Revocation cleanup incomplete");
                }
                RevocationCheck::Revoked
            }
        }
    }

    /// Every step runs even if an earlier one failed; the first error is returned.
    async fn handle_revocation(
        &self,
        identity: &str,
        now: &DateTime<FixedOffset>,
    ) -> Result<(), CoordinatorError> {
        let cancelled = self.sink.cancel_all().await;
        let cleared = self.day_index.clear_for_date(identity, now.date_naive());

        self.events.report(CoordinatorEvent::PermissionRevoked {
            identity: identity.to_string(),
            at: *now,
        });
        self.events.notify_user(UserNotice::PermissionRevoked);

        self.record_intent(identity, false)?;
        cancelled?;
        cleared?;
        Ok(())
    }
}
