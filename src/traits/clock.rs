//! Wall-clock source

use chrono::{DateTime, FixedOffset};

/// Source of the current local time, including the device's UTC offset.
///
/// Production: `chrono::Local`
/// Testing: a clock driven by tokio's (pausable) time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}
