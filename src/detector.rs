//! Decides whether the calendar date or the UTC offset moved since the last
//! successful reschedule.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};

use crate::checkpoint::SchedulerCheckpoint;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSignal {
    pub date_changed: bool,
    pub tz_changed: bool,
}

impl ChangeSignal {
    pub fn any(&self) -> bool {
        self.date_changed || self.tz_changed
    }
}

/// Offset of `now` from UTC in whole minutes
pub fn offset_minutes(now: &DateTime<FixedOffset>) -> i32 {
    now.offset().local_minus_utc() / 60
}

/// Compare today and the current offset against the checkpoint.
/// A missing checkpoint reports both flags.
pub fn detect(
    today: NaiveDate,
    current_offset_minutes: i32,
    checkpoint: Option<&SchedulerCheckpoint>,
) -> ChangeSignal {
    match checkpoint {
        None => ChangeSignal {
            date_changed: true,
            tz_changed: true,
        },
        Some(cp) => {
            let last = cp.last_run_date;
            ChangeSignal {
                date_changed: last.year() != today.year()
                    || last.month() != today.month()
                    || last.day() != today.day(),
                tz_changed: cp.last_tz_offset_minutes != current_offset_minutes,
            }
        }
    }
}
