//! Device wall clock

use chrono::{DateTime, FixedOffset, Local};

use crate::traits::Clock;

/// Reads the device clock and its current UTC offset.
///
/// When the local timezone cannot be determined chrono reports UTC, so the
/// coordinator then behaves as if the device were at offset zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}
