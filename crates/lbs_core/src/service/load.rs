//! Load calculator.
//!
//! Pure functions over cache rows and one coefficient set:
//!
//! ```text
//! adjusted = base + ALPHA * N^BETA + SWITCH_COST * max(U - 1, 0)
//! ```
//!
//! where `base` is the summed load, `N` the number of counted rows and `U`
//! the number of distinct context tags. Suppressed rows never count.
//!
//! Level bands are checked top-down: CRITICAL above CAP, then DANGER from
//! 8.0, WARNING from 6.0, SAFE below. With the default CAP of 8.0 a day at
//! exactly 8.0 is DANGER and anything above is CRITICAL.

use crate::model::cache::{DailyCacheEntry, EntryStatus};
use crate::model::coefficients::{CoefficientSet, Coefficients};
use crate::model::task::{OwnerId, TaskId};
use crate::schedule::calendar::DateRange;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const WARNING_THRESHOLD: f64 = 6.0;
pub const DANGER_THRESHOLD: f64 = 8.0;
/// Days below this adjusted load count as recovery days.
pub const RECOVERY_THRESHOLD: f64 = 4.0;
pub const TREND_BUCKET_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadLevel {
    Safe,
    Warning,
    Danger,
    Critical,
}

impl LoadLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Warning => "WARNING",
            Self::Danger => "DANGER",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Classifies an adjusted load against `cap`.
pub fn classify(adjusted_load: f64, cap: f64) -> LoadLevel {
    if adjusted_load > cap {
        LoadLevel::Critical
    } else if adjusted_load >= DANGER_THRESHOLD {
        LoadLevel::Danger
    } else if adjusted_load >= WARNING_THRESHOLD {
        LoadLevel::Warning
    } else {
        LoadLevel::Safe
    }
}

/// One contributing row of a day's load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEntry {
    pub entry_key: String,
    pub task_id: Option<TaskId>,
    pub task_name: String,
    pub context: String,
    pub load: f64,
    pub status: EntryStatus,
}

/// Full load breakdown for one owner and date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSnapshot {
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub base_load: f64,
    pub task_count: usize,
    pub context_count: usize,
    pub count_penalty: f64,
    pub switch_penalty: f64,
    pub adjusted_load: f64,
    pub level: LoadLevel,
    pub overflow: bool,
    pub cap: f64,
    /// Version of the coefficient set used; 0 means built-in defaults.
    pub coefficients_version: u32,
    pub entries: Vec<LoadEntry>,
}

/// Compact per-day load, as returned by range queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyLoad {
    pub date: NaiveDate,
    pub base_load: f64,
    pub adjusted_load: f64,
    pub task_count: usize,
    pub context_count: usize,
    pub level: LoadLevel,
    pub overflow: bool,
}

impl From<&LoadSnapshot> for DailyLoad {
    fn from(snapshot: &LoadSnapshot) -> Self {
        Self {
            date: snapshot.date,
            base_load: snapshot.base_load,
            adjusted_load: snapshot.adjusted_load,
            task_count: snapshot.task_count,
            context_count: snapshot.context_count,
            level: snapshot.level,
            overflow: snapshot.overflow,
        }
    }
}

/// Evaluates the load formula without row bookkeeping.
pub fn adjusted_load(
    base_load: f64,
    task_count: usize,
    context_count: usize,
    coefficients: &Coefficients,
) -> (f64, f64, f64) {
    if task_count == 0 {
        return (base_load, 0.0, 0.0);
    }
    let count_penalty = coefficients.alpha * (task_count as f64).powf(coefficients.beta);
    let switch_penalty = coefficients.switch_cost * context_count.saturating_sub(1) as f64;
    (
        base_load + count_penalty + switch_penalty,
        count_penalty,
        switch_penalty,
    )
}

/// Computes the snapshot for `date` from that day's cache rows.
///
/// Rows for other dates are ignored.
pub fn calculate_day(
    owner_id: OwnerId,
    date: NaiveDate,
    rows: &[DailyCacheEntry],
    coefficient_set: &CoefficientSet,
) -> LoadSnapshot {
    let coefficients = &coefficient_set.coefficients;
    let counted: Vec<&DailyCacheEntry> = rows
        .iter()
        .filter(|row| row.target_date == date && row.counts_toward_load())
        .collect();

    let base_load: f64 = counted.iter().map(|row| row.load).sum();
    let contexts: BTreeSet<&str> = counted.iter().map(|row| row.context.trim()).collect();
    let (adjusted, count_penalty, switch_penalty) =
        adjusted_load(base_load, counted.len(), contexts.len(), coefficients);

    LoadSnapshot {
        owner_id,
        date,
        base_load,
        task_count: counted.len(),
        context_count: contexts.len(),
        count_penalty,
        switch_penalty,
        adjusted_load: adjusted,
        level: classify(adjusted, coefficients.cap),
        overflow: adjusted > coefficients.cap,
        cap: coefficients.cap,
        coefficients_version: coefficient_set.version,
        entries: counted
            .into_iter()
            .map(|row| LoadEntry {
                entry_key: row.entry_key.clone(),
                task_id: row.task_id,
                task_name: row.task_name.clone(),
                context: row.context.clone(),
                load: row.load,
                status: row.status,
            })
            .collect(),
    }
}

/// One [`DailyLoad`] per day of `range`, ascending, empty days included.
pub fn daily_loads(
    owner_id: OwnerId,
    range: DateRange,
    rows: &[DailyCacheEntry],
    coefficient_set: &CoefficientSet,
) -> Vec<DailyLoad> {
    let by_date = group_by_date(rows);
    range
        .days()
        .map(|date| {
            let day_rows = by_date.get(&date).map(Vec::as_slice).unwrap_or_default();
            DailyLoad::from(&calculate_day(owner_id, date, day_rows, coefficient_set))
        })
        .collect()
}

fn group_by_date(rows: &[DailyCacheEntry]) -> BTreeMap<NaiveDate, Vec<DailyCacheEntry>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<DailyCacheEntry>> = BTreeMap::new();
    for row in rows {
        by_date.entry(row.target_date).or_default().push(row.clone());
    }
    by_date
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyStats {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Mean adjusted load, rounded to two decimals.
    pub average_load: f64,
    /// Days whose adjusted load exceeds CAP.
    pub over_days: usize,
    /// Days below [`RECOVERY_THRESHOLD`].
    pub recovery_days: usize,
    /// Share of recovery days in percent, rounded to one decimal.
    pub recovery_rate: f64,
    pub daily_loads: Vec<DailyLoad>,
}

/// Aggregates seven consecutive [`DailyLoad`]s.
pub fn weekly_stats(days: Vec<DailyLoad>) -> Option<WeeklyStats> {
    let start_date = days.first()?.date;
    let end_date = days.last()?.date;
    let count = days.len() as f64;

    let total: f64 = days.iter().map(|day| day.adjusted_load).sum();
    let over_days = days.iter().filter(|day| day.overflow).count();
    let recovery_days = days
        .iter()
        .filter(|day| day.adjusted_load < RECOVERY_THRESHOLD)
        .count();

    Some(WeeklyStats {
        start_date,
        end_date,
        average_load: round_to(total / count, 2),
        over_days,
        recovery_days,
        recovery_rate: round_to(recovery_days as f64 / count * 100.0, 1),
        daily_loads: days,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub average_load: f64,
    pub max_load: f64,
    pub min_load: f64,
}

/// Splits ascending daily loads into consecutive 7-day buckets. The last
/// bucket may be shorter.
pub fn load_trends(days: &[DailyLoad]) -> Vec<TrendBucket> {
    days.chunks(TREND_BUCKET_DAYS)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            let loads = chunk.iter().map(|day| day.adjusted_load);
            let total: f64 = loads.clone().sum();
            Some(TrendBucket {
                start_date: first.date,
                end_date: last.date,
                average_load: round_to(total / chunk.len() as f64, 2),
                max_load: loads.clone().fold(f64::MIN, f64::max),
                min_load: loads.fold(f64::MAX, f64::min),
            })
        })
        .collect()
}

/// Load of one context tag on one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextLoad {
    pub date: NaiveDate,
    pub context: String,
    pub load: f64,
    pub task_count: usize,
}

/// Sums counted rows per `(date, context)`, ordered by date then context.
pub fn context_distribution(rows: &[DailyCacheEntry]) -> Vec<ContextLoad> {
    let mut totals: BTreeMap<(NaiveDate, &str), (f64, usize)> = BTreeMap::new();
    for row in rows.iter().filter(|row| row.counts_toward_load()) {
        let slot = totals
            .entry((row.target_date, row.context.trim()))
            .or_insert((0.0, 0));
        slot.0 += row.load;
        slot.1 += 1;
    }
    totals
        .into_iter()
        .map(|((date, context), (load, task_count))| ContextLoad {
            date,
            context: context.to_string(),
            load,
            task_count,
        })
        .collect()
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cache::EntryOrigin;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(owner: OwnerId, day: NaiveDate, load: f64, context: &str) -> DailyCacheEntry {
        let task_id = Uuid::new_v4();
        DailyCacheEntry {
            owner_id: owner,
            target_date: day,
            entry_key: task_id.to_string(),
            task_id: Some(task_id),
            task_name: format!("task {load}"),
            context: context.to_string(),
            load,
            status: EntryStatus::Planned,
            origin: EntryOrigin::Rule,
        }
    }

    #[test]
    fn four_tasks_in_two_contexts_go_critical() {
        let owner = Uuid::new_v4();
        let day = date(2025, 3, 3);
        let rows = vec![
            row(owner, day, 2.0, "work"),
            row(owner, day, 3.0, "work"),
            row(owner, day, 1.5, "home"),
            row(owner, day, 2.5, "home"),
        ];

        let snapshot = calculate_day(owner, day, &rows, &CoefficientSet::defaults_for(owner));
        assert_eq!(snapshot.base_load, 9.0);
        assert_eq!(snapshot.task_count, 4);
        assert_eq!(snapshot.context_count, 2);
        assert!((snapshot.count_penalty - 0.1 * 4f64.powf(1.2)).abs() < 1e-12);
        assert_eq!(snapshot.switch_penalty, 0.5);
        assert!((snapshot.adjusted_load - 10.028).abs() < 0.001);
        assert_eq!(snapshot.level, LoadLevel::Critical);
        assert!(snapshot.overflow);
        assert_eq!(snapshot.entries.len(), 4);
    }

    #[test]
    fn band_edges_are_inclusive_below_cap() {
        assert_eq!(classify(5.999, 8.0), LoadLevel::Safe);
        assert_eq!(classify(6.0, 8.0), LoadLevel::Warning);
        assert_eq!(classify(8.0, 8.0), LoadLevel::Danger);
        assert_eq!(classify(8.0001, 8.0), LoadLevel::Critical);
        assert_eq!(classify(9.5, 10.0), LoadLevel::Danger);
    }

    #[test]
    fn empty_day_has_no_penalties() {
        let owner = Uuid::new_v4();
        let snapshot = calculate_day(
            owner,
            date(2025, 3, 3),
            &[],
            &CoefficientSet::defaults_for(owner),
        );
        assert_eq!(snapshot.adjusted_load, 0.0);
        assert_eq!(snapshot.count_penalty, 0.0);
        assert_eq!(snapshot.switch_penalty, 0.0);
        assert_eq!(snapshot.level, LoadLevel::Safe);
        assert!(!snapshot.overflow);
    }

    #[test]
    fn suppressed_rows_and_blank_contexts() {
        let owner = Uuid::new_v4();
        let day = date(2025, 3, 3);
        let mut suppressed = row(owner, day, 5.0, "work");
        suppressed.status = EntryStatus::Suppressed;
        let mut completed = row(owner, day, 1.0, " ");
        completed.status = EntryStatus::Completed;
        let rows = vec![suppressed, completed, row(owner, day, 1.0, "")];

        let snapshot = calculate_day(owner, day, &rows, &CoefficientSet::defaults_for(owner));
        assert_eq!(snapshot.base_load, 2.0);
        assert_eq!(snapshot.task_count, 2);
        assert_eq!(snapshot.context_count, 1);
        assert_eq!(snapshot.switch_penalty, 0.0);
    }

    #[test]
    fn weekly_stats_counts_over_and_recovery_days() {
        let owner = Uuid::new_v4();
        let start = date(2025, 3, 3);
        let range = DateRange::new(start, date(2025, 3, 9)).unwrap();
        let rows = vec![
            row(owner, start, 9.0, "work"),
            row(owner, date(2025, 3, 4), 5.0, "work"),
        ];

        let days = daily_loads(owner, range, &rows, &CoefficientSet::defaults_for(owner));
        assert_eq!(days.len(), 7);
        let stats = weekly_stats(days).unwrap();
        assert_eq!(stats.over_days, 1);
        assert_eq!(stats.recovery_days, 5);
        assert_eq!(stats.recovery_rate, 71.4);
        assert_eq!(stats.end_date, date(2025, 3, 9));
    }

    #[test]
    fn trends_truncate_last_bucket() {
        let owner = Uuid::new_v4();
        let range = DateRange::new(date(2025, 3, 1), date(2025, 3, 10)).unwrap();
        let rows = vec![row(owner, date(2025, 3, 2), 3.0, "work")];

        let days = daily_loads(owner, range, &rows, &CoefficientSet::defaults_for(owner));
        let buckets = load_trends(&days);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].end_date, date(2025, 3, 7));
        assert_eq!(buckets[0].min_load, 0.0);
        assert!((buckets[0].max_load - 3.1).abs() < 1e-9);
        assert_eq!(buckets[1].start_date, date(2025, 3, 8));
        assert_eq!(buckets[1].end_date, date(2025, 3, 10));
    }

    #[test]
    fn context_distribution_groups_by_date_and_trimmed_context() {
        let owner = Uuid::new_v4();
        let day = date(2025, 3, 3);
        let rows = vec![
            row(owner, day, 2.0, "work "),
            row(owner, day, 1.0, "work"),
            row(owner, day, 4.0, "gym"),
        ];

        let distribution = context_distribution(&rows);
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].context, "gym");
        assert_eq!(distribution[1].context, "work");
        assert_eq!(distribution[1].load, 3.0);
        assert_eq!(distribution[1].task_count, 2);
    }
}
