// crates/scan-manager-core/src/core/calendar.rs
// ============================================================================
// Module: Schedule Calendar Arithmetic
// Description: Fire-time computation for fixed-period and monthly schedules.
// Purpose: Provide the pure timing functions the schedule evaluator ticks on.
// Dependencies: time
// ============================================================================

//! ## Overview
//! A schedule is `(first_time, period, period_months, duration)` in unix
//! seconds. Fixed periods step by `period`; monthly schedules step by
//! calendar months with the day-of-month clamped into short months. Fire
//! times are always derived from `first_time` directly (never iterated from
//! the previous fire), so a clamped February never shifts later months.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Date;
use time::Month;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Month Arithmetic
// ============================================================================

/// Adds `months` calendar months to a unix timestamp, preserving the
/// day-of-month where possible and clamping to the target month's last day
/// otherwise. Time-of-day is preserved. Returns `t` unchanged when the
/// timestamp does not break down (out of the representable range).
#[must_use]
pub fn add_months(t: i64, months: i64) -> i64 {
    let Ok(moment) = OffsetDateTime::from_unix_timestamp(t) else {
        return t;
    };
    let date = moment.date();
    let total = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + months;
    let year = total.div_euclid(12);
    let month_index = total.rem_euclid(12);
    let Ok(year) = i32::try_from(year) else {
        return t;
    };
    let Ok(month_number) = u8::try_from(month_index + 1) else {
        return t;
    };
    let Ok(month) = Month::try_from(month_number) else {
        return t;
    };
    let day = date.day().min(month.length(year));
    let Ok(new_date) = Date::from_calendar_date(year, month, day) else {
        return t;
    };
    new_date.with_time(moment.time()).assume_utc().unix_timestamp()
}

/// Counts the full calendar months from `t1` to `t2`.
///
/// The raw year/month difference is corrected by one when `t2`'s position
/// within its month (day, then time-of-day) has not yet reached `t1`'s.
/// Returns 0 when `t2` precedes `t1` or either timestamp does not break
/// down.
#[must_use]
pub fn months_between(t1: i64, t2: i64) -> i64 {
    if t2 < t1 {
        return 0;
    }
    let (Ok(start), Ok(end)) = (
        OffsetDateTime::from_unix_timestamp(t1),
        OffsetDateTime::from_unix_timestamp(t2),
    ) else {
        return 0;
    };
    let mut months = (i64::from(end.year()) - i64::from(start.year())) * 12
        + i64::from(u8::from(end.date().month()))
        - i64::from(u8::from(start.date().month()));
    let start_position = (start.day(), start.time());
    let end_position = (end.day(), end.time());
    if end_position < start_position {
        months -= 1;
    }
    months.max(0)
}

// ============================================================================
// SECTION: Schedule Timing
// ============================================================================

/// The timing columns of a schedule row.
///
/// # Invariants
/// - At most one of `period` and `period_months` is nonzero.
/// - `duration == 0` means no enforced stop window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleTiming {
    /// First fire time, unix seconds.
    pub first_time: i64,
    /// Fixed period in seconds, or 0.
    pub period: i64,
    /// Calendar-month period, or 0.
    pub period_months: i64,
    /// Enforced scan window in seconds, or 0.
    pub duration: i64,
}

impl ScheduleTiming {
    /// First fire time at or after `now`. Returns 0 when the schedule is
    /// exhausted (a one-shot whose fire time has passed).
    #[must_use]
    pub fn next_fire(&self, now: i64) -> i64 {
        if now <= self.first_time {
            return self.first_time;
        }
        if self.period > 0 {
            let elapsed = now - self.first_time;
            let steps = elapsed.div_euclid(self.period)
                + i64::from(elapsed.rem_euclid(self.period) != 0);
            return self.first_time + steps * self.period;
        }
        if self.period_months > 0 {
            // The month count undercounts by one when a clamped fire day
            // (the 29th standing in for the 31st) has passed but the
            // original day position has not, so probe upward.
            let mut steps = months_between(self.first_time, now);
            let mut candidate = add_months(self.first_time, steps);
            while candidate < now {
                steps += 1;
                candidate = add_months(self.first_time, steps);
            }
            return candidate;
        }
        0
    }

    /// Most recent fire time at or before `now`, if any fire has occurred.
    #[must_use]
    pub fn most_recent_fire(&self, now: i64) -> Option<i64> {
        if now < self.first_time {
            return None;
        }
        if self.period > 0 {
            let steps = (now - self.first_time).div_euclid(self.period);
            return Some(self.first_time + steps * self.period);
        }
        if self.period_months > 0 {
            // Same clamped-day probing as next_fire, from below.
            let mut steps = months_between(self.first_time, now);
            while add_months(self.first_time, steps + 1) <= now {
                steps += 1;
            }
            while steps > 0 && add_months(self.first_time, steps) > now {
                steps -= 1;
            }
            return Some(add_months(self.first_time, steps));
        }
        Some(self.first_time)
    }

    /// Whether the windowed duration has been exceeded: `duration` is
    /// enforced and more than `duration` seconds have passed since the most
    /// recent fire.
    #[must_use]
    pub fn stop_window_exceeded(&self, now: i64) -> bool {
        if self.duration <= 0 {
            return false;
        }
        self.most_recent_fire(now)
            .is_some_and(|fired| now - fired > self.duration)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
