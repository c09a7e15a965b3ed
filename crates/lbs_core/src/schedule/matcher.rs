//! Rule matcher: decides whether a task occurs on a date.

use crate::model::task::{RecurrenceRule, Task};
use crate::schedule::calendar::{day_difference, month_day_exists, nth_weekday_of_month};
use chrono::{Datelike, NaiveDate};

/// Returns whether `task` produces an occurrence on `date`.
///
/// Inactive tasks and dates outside the inclusive validity window never match.
pub fn matches(task: &Task, date: NaiveDate) -> bool {
    if !task.active || !task.is_within_window(date) {
        return false;
    }
    rule_matches(&task.rule, date)
}

/// Evaluates only the recurrence rule, ignoring active flag and window.
pub fn rule_matches(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    match rule {
        RecurrenceRule::Once { due_date } => date == *due_date,
        RecurrenceRule::Weekly { days } => days.contains(date.weekday()),
        RecurrenceRule::EveryNDays {
            anchor_date,
            interval_days,
        } => {
            let diff = day_difference(*anchor_date, date);
            *interval_days > 0 && diff >= 0 && diff % i64::from(*interval_days) == 0
        }
        RecurrenceRule::MonthlyDay { month_day } => {
            month_day_exists(date.year(), date.month(), *month_day) && date.day() == *month_day
        }
        RecurrenceRule::MonthlyNthWeekday { nth, weekday } => {
            nth_weekday_of_month(date.year(), date.month(), *nth, *weekday) == Some(date)
        }
    }
}
