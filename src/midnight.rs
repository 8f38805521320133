//! Once-per-day wake-up at local midnight
//!
//! The timer never trusts a single long sleep. Monotonic timers may stop while
//! the device is suspended and the UTC offset may move under us, so the timer
//! sleeps in bounded slices and fires as soon as the wall clock shows a
//! different local date than the one it was armed on.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::traits::Clock;

/// Next local midnight after `now`, in `now`'s offset
pub fn next_midnight(now: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let tomorrow = now.date_naive().succ_opt()?;
    let midnight = tomorrow.and_hms_opt(0, 0, 0)?;
    now.offset().from_local_datetime(&midnight).single()
}

/// Time left until the next local midnight, clamped at zero
pub fn duration_until_next_midnight(now: &DateTime<FixedOffset>) -> Duration {
    next_midnight(now)
        .and_then(|midnight| (midnight - *now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidnightTimer {
    armed_for: NaiveDate,
    slice: Duration,
}

impl MidnightTimer {
    /// Arm for the local date the clock shows right now
    pub fn arm(clock: &dyn Clock, slice: Duration) -> Self {
        let now = clock.now();
        let timer = Self {
            armed_for: now.date_naive(),
            slice,
        };
        tracing::debug!(
            armed_for = %timer.armed_for,
            wait_secs = duration_until_next_midnight(&now).as_secs(),
            "Midnight timer armed"
        );
        timer
    }

    pub fn armed_for(&self) -> NaiveDate {
        self.armed_for
    }

    pub fn is_due(&self, now: &DateTime<FixedOffset>) -> bool {
        now.date_naive() != self.armed_for
    }

    /// Resolve with the new local date once the day has rolled over.
    ///
    /// Cancel safe; each poll only sleeps.
    pub async fn fired(&self, clock: &dyn Clock) -> NaiveDate {
        loop {
            let now = clock.now();
            if self.is_due(&now) {
                return now.date_naive();
            }
            let remaining = duration_until_next_midnight(&now);
            let wait = if remaining.is_zero() {
                self.slice
            } else {
                remaining.min(self.slice)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ManualClock;

    fn at(h: u32, m: u32, s: u32, offset_minutes: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_minutes * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 10, h, m, s)
            .unwrap()
    }

    #[test]
    fn test_duration_until_next_midnight() {
        assert_eq!(
            duration_until_next_midnight(&at(23, 0, 0, 60)),
            Duration::from_secs(3600)
        );
        assert_eq!(
            duration_until_next_midnight(&at(0, 0, 0, -300)),
            Duration::from_secs(24 * 3600)
        );
        assert_eq!(
            duration_until_next_midnight(&at(23, 59, 59, 0)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_next_midnight_crosses_month_and_year() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let new_years_eve = offset.with_ymd_and_hms(2026, 12, 31, 18, 0, 0).unwrap();

        let midnight = next_midnight(&new_years_eve).unwrap();

        assert_eq!(midnight, offset.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_is_due_only_after_date_changes() {
        let clock = ManualClock::new(at(22, 0, 0, 60));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));

        assert_eq!(timer.armed_for(), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert!(!timer.is_due(&at(23, 59, 59, 60)));
        assert!(timer.is_due(&(at(23, 59, 59, 60) + chrono::Duration::seconds(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_midnight() {
        let clock = ManualClock::new(at(23, 0, 0, 60));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));
        let started = tokio::time::Instant::now();

        let date = timer.fired(&clock).await;

        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3600));
        assert!(waited < Duration::from_secs(3601));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_the_date_changes() {
        let clock = ManualClock::new(at(23, 59, 0, 60));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));
        let mut fired = tokio_test::task::spawn(timer.fired(&clock));

        tokio_test::assert_pending!(fired.poll());
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio_test::assert_pending!(fired.poll());
        tokio::time::advance(Duration::from_secs(30)).await;
        let date = tokio_test::assert_ready!(fired.poll());

        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_after_suspension_past_midnight() {
        let clock = ManualClock::new(at(23, 0, 0, 60));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));

        // Device slept through midnight without the monotonic clock moving
        clock.advance(Duration::from_secs(5 * 3600));
        let started = tokio::time::Instant::now();

        let date = timer.fired(&clock).await;

        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_change_pulls_midnight_earlier() {
        let clock = ManualClock::new(at(23, 0, 0, 60));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));

        // Travelling east: the same instant is already 00:30 on the next day
        clock.set_offset_minutes(150);

        let date = timer.fired(&clock).await;

        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_jump_is_noticed_within_one_slice() {
        let clock = ManualClock::new(at(12, 0, 0, 0));
        let timer = MidnightTimer::arm(&clock, Duration::from_secs(60));
        let clock = std::sync::Arc::new(clock);

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move { timer.fired(&*clock).await })
        };
        tokio::time::sleep(Duration::from_secs(30)).await;
        clock.advance(Duration::from_secs(13 * 3600));
        let started = tokio::time::Instant::now();

        let date = waiter.await.unwrap();

        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert!(started.elapsed() <= Duration::from_secs(60));
    }
}
