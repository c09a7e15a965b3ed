//! Calendar arithmetic on `chrono::NaiveDate`.

use crate::model::task::NthWeekday;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Maps the stored `1 = Monday .. 7 = Sunday` form to a weekday.
pub fn weekday_from_mon1(value: i64) -> Option<Weekday> {
    match value {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

/// Inverse of [`weekday_from_mon1`].
pub fn weekday_to_mon1(weekday: Weekday) -> i64 {
    i64::from(weekday.number_from_monday())
}

/// Number of days in `month`, or `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = first.checked_add_months(chrono::Months::new(1))?;
    u32::try_from(next_first.signed_duration_since(first).num_days()).ok()
}

/// Returns whether `day` exists in the given month (e.g. no 31st in April).
pub fn month_day_exists(year: i32, month: u32, day: u32) -> bool {
    NaiveDate::from_ymd_opt(year, month, day).is_some()
}

/// Date of the n-th `weekday` in a month, or its last occurrence.
///
/// Returns `None` when the month has fewer than n occurrences (4th/5th).
pub fn nth_weekday_of_month(
    year: i32,
    month: u32,
    nth: NthWeekday,
    weekday: Weekday,
) -> Option<NaiveDate> {
    match nth {
        NthWeekday::Last => {
            let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month)?)?;
            let back = (7 + last.weekday().num_days_from_monday()
                - weekday.num_days_from_monday())
                % 7;
            last.checked_sub_days(Days::new(u64::from(back)))
        }
        other => {
            let n = u8::try_from(other.index()).ok()?;
            NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
        }
    }
}

/// Signed day count from `anchor` to `target`; negative when target is earlier.
pub fn day_difference(anchor: NaiveDate, target: NaiveDate) -> i64 {
    target.signed_duration_since(anchor).num_days()
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Overlap of two ranges, `None` when disjoint.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        Self::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest range covering both `self` and `other`.
    pub fn span(&self, other: &DateRange) -> DateRange {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Number of days in the range (at least 1).
    pub fn len_days(&self) -> i64 {
        day_difference(self.start, self.end) + 1
    }

    /// Every date from `start` to `end`, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2025, 2), Some(28));
        assert_eq!(days_in_month(2025, 4), Some(30));
        assert_eq!(days_in_month(2025, 12), Some(31));
        assert_eq!(days_in_month(2025, 13), None);
    }

    #[test]
    fn month_day_exists_skips_short_months() {
        assert!(!month_day_exists(2025, 4, 31));
        assert!(month_day_exists(2025, 5, 31));
        assert!(!month_day_exists(2025, 2, 29));
        assert!(month_day_exists(2024, 2, 29));
    }

    #[test]
    fn nth_weekday_resolves_forward_and_last() {
        // March 2025 starts on a Saturday.
        assert_eq!(
            nth_weekday_of_month(2025, 3, NthWeekday::First, Weekday::Mon),
            Some(date(2025, 3, 3))
        );
        assert_eq!(
            nth_weekday_of_month(2025, 3, NthWeekday::Fifth, Weekday::Mon),
            Some(date(2025, 3, 31))
        );
        assert_eq!(
            nth_weekday_of_month(2025, 3, NthWeekday::Last, Weekday::Sat),
            Some(date(2025, 3, 29))
        );
        assert_eq!(
            nth_weekday_of_month(2025, 3, NthWeekday::Last, Weekday::Mon),
            Some(date(2025, 3, 31))
        );
    }

    #[test]
    fn fifth_weekday_missing_is_none() {
        // February 2025 has exactly four Mondays.
        assert_eq!(
            nth_weekday_of_month(2025, 2, NthWeekday::Fifth, Weekday::Mon),
            None
        );
        assert_eq!(
            nth_weekday_of_month(2025, 2, NthWeekday::Fourth, Weekday::Mon),
            Some(date(2025, 2, 24))
        );
    }

    #[test]
    fn day_difference_is_signed() {
        assert_eq!(day_difference(date(2025, 1, 1), date(2025, 1, 4)), 3);
        assert_eq!(day_difference(date(2025, 1, 4), date(2025, 1, 1)), -3);
        assert_eq!(day_difference(date(2024, 12, 31), date(2025, 3, 1)), 60);
    }

    #[test]
    fn date_range_intersect_and_iterate() {
        let a = DateRange::new(date(2025, 1, 1), date(2025, 1, 10)).unwrap();
        let b = DateRange::new(date(2025, 1, 8), date(2025, 2, 1)).unwrap();
        let overlap = a.intersect(&b).unwrap();
        assert_eq!(overlap, DateRange::new(date(2025, 1, 8), date(2025, 1, 10)).unwrap());
        assert_eq!(overlap.days().count(), 3);
        assert_eq!(overlap.len_days(), 3);

        let disjoint = DateRange::single(date(2025, 3, 1));
        assert!(a.intersect(&disjoint).is_none());
        assert!(DateRange::new(date(2025, 1, 2), date(2025, 1, 1)).is_none());
    }

    #[test]
    fn weekday_mon1_roundtrip() {
        for value in 1..=7 {
            let weekday = weekday_from_mon1(value).unwrap();
            assert_eq!(weekday_to_mon1(weekday), value);
        }
        assert_eq!(weekday_from_mon1(0), None);
        assert_eq!(weekday_from_mon1(8), None);
    }
}
