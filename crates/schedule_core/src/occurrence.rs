//! crates/schedule_core/src/occurrence.rs
//!
//! Decides whether a calendar date is an instance of a recurring series defined
//! by an anchor date and an interval in days.

use chrono::{Datelike, Days, NaiveDate};

use crate::error::{ScheduleError, ScheduleResult};

const DAYS_PER_WEEK: i64 = 7;

/// Returns `true` if `date` is an occurrence of the series anchored at `start`.
///
/// A series without an interval happens once, on `start`.
///
/// # Errors
/// - `InvalidRecurrence` if the interval is zero or negative.
/// - `OutOfRange` if stepping the series leaves the supported calendar.
pub fn is_occurrence(
    date: NaiveDate,
    start: NaiveDate,
    interval_days: Option<i64>,
) -> ScheduleResult<bool> {
    match interval_days {
        None => Ok(date == start),
        Some(interval) => Ok(closest_future_occurrence(date, start, interval)? == date),
    }
}

/// Finds the first occurrence of the series that is not before `date`.
///
/// For weekly or longer intervals the anchor is first moved, within its own
/// week, onto `date`'s weekday; the series then advances from that aligned
/// anchor. Sub-week intervals step from the unmodified anchor.
///
/// # Errors
/// - `InvalidRecurrence` if `interval_days` is zero or negative.
/// - `OutOfRange` if the next occurrence lies beyond the supported calendar.
pub fn closest_future_occurrence(
    date: NaiveDate,
    start: NaiveDate,
    interval_days: i64,
) -> ScheduleResult<NaiveDate> {
    if interval_days <= 0 {
        return Err(ScheduleError::InvalidRecurrence(interval_days));
    }

    let mut occurrence = if interval_days >= DAYS_PER_WEEK {
        align_weekday(start, date)?
    } else {
        start
    };

    // Jump close to the target in one step instead of walking long-lived series.
    let distance = (date - occurrence).num_days();
    if distance > 0 {
        let factor = distance / interval_days;
        if factor > 0 {
            occurrence = advance(occurrence, factor * interval_days)?;
        }
    }

    // At most one more step: the jump above lands within one interval of `date`.
    while occurrence < date {
        occurrence = advance(occurrence, interval_days)?;
    }

    Ok(occurrence)
}

/// Moves `anchor` within its Monday-to-Sunday week onto the weekday of `target`.
fn align_weekday(anchor: NaiveDate, target: NaiveDate) -> ScheduleResult<NaiveDate> {
    let anchor_day = i64::from(anchor.weekday().num_days_from_monday());
    let target_day = i64::from(target.weekday().num_days_from_monday());
    let shift = target_day - anchor_day;

    let aligned = if shift >= 0 {
        anchor.checked_add_days(Days::new(shift.unsigned_abs()))
    } else {
        anchor.checked_sub_days(Days::new(shift.unsigned_abs()))
    };
    aligned.ok_or(ScheduleError::OutOfRange)
}

fn advance(date: NaiveDate, days: i64) -> ScheduleResult<NaiveDate> {
    date.checked_add_days(Days::new(days.unsigned_abs()))
        .ok_or(ScheduleError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn finds_closest_future_occurrence() {
        let cases = [
            (date(2020, 1, 2), date(2020, 1, 1), 1, date(2020, 1, 2)),
            (date(2020, 1, 2), date(2020, 1, 1), 5, date(2020, 1, 6)),
            (date(2020, 12, 31), date(2020, 1, 1), 2, date(2021, 1, 1)),
            (date(2020, 5, 10), date(2020, 5, 10), 14, date(2020, 5, 10)),
            (date(2020, 5, 11), date(2020, 5, 10), 14, date(2020, 5, 18)),
        ];
        for (today, start, interval, expected) in cases {
            assert_eq!(
                closest_future_occurrence(today, start, interval).unwrap(),
                expected,
                "date {today}, start {start}, interval {interval}"
            );
        }
    }

    #[test]
    fn detects_occurrences() {
        let cases = [
            (date(2020, 1, 1), date(2020, 1, 1), None, true),
            (date(2020, 1, 2), date(2020, 1, 1), Some(1), true),
            (date(2020, 1, 2), date(2020, 1, 1), Some(2), false),
        ];
        for (today, start, interval, expected) in cases {
            assert_eq!(is_occurrence(today, start, interval).unwrap(), expected);
        }
    }

    #[test]
    fn one_time_series_matches_only_its_start() {
        let start = date(2021, 3, 15);
        assert!(is_occurrence(start, start, None).unwrap());
        assert!(!is_occurrence(date(2021, 3, 16), start, None).unwrap());
        assert!(!is_occurrence(date(2021, 3, 14), start, None).unwrap());
    }

    #[test]
    fn weekly_series_takes_the_weekday_of_the_target() {
        // Anchored on Wednesday 2020-01-01; Monday 2020-01-06 aligns to
        // Monday 2019-12-30 and lands one week later.
        assert!(is_occurrence(date(2020, 1, 6), date(2020, 1, 1), Some(7)).unwrap());
        assert!(is_occurrence(date(2020, 1, 14), date(2020, 1, 1), Some(7)).unwrap());

        // Fortnightly: the off-week Monday is not an occurrence.
        assert!(!is_occurrence(date(2020, 1, 6), date(2020, 1, 1), Some(14)).unwrap());
        assert!(is_occurrence(date(2020, 1, 13), date(2020, 1, 1), Some(14)).unwrap());
    }

    #[test]
    fn long_lived_series_are_resolved_without_walking() {
        let start = date(2000, 1, 3);
        assert_eq!(
            closest_future_occurrence(date(2099, 12, 28), start, 1).unwrap(),
            date(2099, 12, 28)
        );
        assert!(is_occurrence(date(2099, 12, 28), start, Some(7)).unwrap());
    }

    #[test]
    fn rejects_non_positive_intervals() {
        for interval in [0, -1, -14] {
            assert_eq!(
                closest_future_occurrence(date(2020, 1, 2), date(2020, 1, 1), interval),
                Err(ScheduleError::InvalidRecurrence(interval))
            );
            assert!(is_occurrence(date(2020, 1, 2), date(2020, 1, 1), Some(interval)).is_err());
        }
    }

    #[test]
    fn reports_steps_past_the_calendar() {
        let result = closest_future_occurrence(NaiveDate::MAX, date(2020, 1, 1), i64::MAX / 2);
        assert_eq!(result, Err(ScheduleError::OutOfRange));
    }

    #[test]
    fn result_is_the_earliest_occurrence_not_before_the_date() {
        let start = date(2020, 1, 1);
        for interval in [1_i64, 2, 3, 5, 7, 14, 21] {
            for offset in 0..60u64 {
                let today = start + Days::new(offset);
                let found = closest_future_occurrence(today, start, interval).unwrap();
                assert!(found >= today);
                assert!((found - today).num_days() < interval);
                if interval < DAYS_PER_WEEK {
                    assert_eq!((found - start).num_days() % interval, 0);
                }
            }
        }
    }

    #[test]
    fn repeated_lookup_is_idempotent() {
        let start = date(2020, 1, 1);
        for interval in [1_i64, 3, 6, 7, 14, 28] {
            for offset in 0..45u64 {
                let today = start + Days::new(offset);
                let first = closest_future_occurrence(today, start, interval).unwrap();
                let again = closest_future_occurrence(today, first, interval).unwrap();
                assert_eq!(again, first, "interval {interval}, date {today}");
            }
        }
    }

    #[test]
    fn later_dates_never_yield_earlier_occurrences() {
        let start = date(2020, 2, 27);
        for interval in [1_i64, 2, 4, 6] {
            let mut previous = closest_future_occurrence(start, start, interval).unwrap();
            for offset in 1..90u64 {
                let current =
                    closest_future_occurrence(start + Days::new(offset), start, interval).unwrap();
                assert!(current >= previous, "interval {interval}, offset {offset}");
                previous = current;
            }
        }
    }

    #[test]
    fn weekly_cadences_are_monotonic_per_weekday() {
        // Multi-week series are anchored per weekday, so ordering is only
        // guaranteed between dates that share one.
        let start = date(2020, 2, 27);
        for interval in [7_i64, 14, 21] {
            for first_day in 0..7u64 {
                let mut previous =
                    closest_future_occurrence(start + Days::new(first_day), start, interval)
                        .unwrap();
                for week in 1..20u64 {
                    let today = start + Days::new(first_day + week * 7);
                    let current = closest_future_occurrence(today, start, interval).unwrap();
                    assert!(current >= previous, "interval {interval}, date {today}");
                    previous = current;
                }
            }
        }
    }
}
