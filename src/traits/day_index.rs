//! Per-day delivery bookkeeping trait

use chrono::NaiveDate;

use super::StoreError;

/// Records of which reminders were already shown on which date.
///
/// Clearing is cheap, local-only and idempotent, so the coordinator calls it
/// whenever it suspects the records are stale.
///
/// Production: SQLite `delivered_reminders` table
/// Testing: In-memory set
#[cfg_attr(test, mockall::automock)]
pub trait DayIndexStore: Send + Sync {
    /// Remove every record for `identity` on `date`
    fn clear_for_date(&self, identity: &str, date: NaiveDate) -> Result<(), StoreError>;

    /// Remove every record dated before `today`, for all identities
    fn clear_all_for_yesterday(&self, today: NaiveDate) -> Result<(), StoreError>;
}
