//! Property-based tests for cache materialization and exception precedence.

use chrono::{Days, NaiveDate, Weekday};
use lbs_core::repo::completion_repo::Completion;
use lbs_core::schedule::matcher::matches;
use lbs_core::schedule::resolver::{resolve, Disposition};
use lbs_core::service::materializer::materialize_rows;
use lbs_core::{
    DateRange, EntryOrigin, EntryStatus, ExceptionKind, NthWeekday, RecurrenceRule, Task,
    TaskException,
};
use proptest::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

const RANGE_DAYS: u64 = 62;

fn range_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
}

fn test_range() -> DateRange {
    let start = range_start();
    DateRange::new(start, start + Days::new(RANGE_DAYS - 1)).unwrap()
}

fn offset(days: u64) -> NaiveDate {
    range_start() + Days::new(days)
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    prop_oneof![
        Just(Weekday::Mon),
        Just(Weekday::Tue),
        Just(Weekday::Wed),
        Just(Weekday::Thu),
        Just(Weekday::Fri),
        Just(Weekday::Sat),
        Just(Weekday::Sun),
    ]
}

fn arb_nth() -> impl Strategy<Value = NthWeekday> {
    prop_oneof![
        Just(NthWeekday::First),
        Just(NthWeekday::Second),
        Just(NthWeekday::Third),
        Just(NthWeekday::Fourth),
        Just(NthWeekday::Fifth),
        Just(NthWeekday::Last),
    ]
}

fn arb_rule() -> impl Strategy<Value = RecurrenceRule> {
    prop_oneof![
        (0u64..RANGE_DAYS).prop_map(|days| RecurrenceRule::once(offset(days))),
        prop::collection::vec(arb_weekday(), 1..4)
            .prop_map(|days| RecurrenceRule::weekly(days).unwrap()),
        (0u64..90, 1i64..=10).prop_map(|(days, interval)| {
            RecurrenceRule::every_n_days(range_start() - Days::new(30) + Days::new(days), interval)
                .unwrap()
        }),
        (1i64..=31).prop_map(|day| RecurrenceRule::monthly_day(day).unwrap()),
        (arb_nth(), arb_weekday())
            .prop_map(|(nth, weekday)| RecurrenceRule::MonthlyNthWeekday { nth, weekday }),
    ]
}

fn arb_context() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("work".to_string()),
        Just("home".to_string()),
        Just(String::new()),
    ]
}

#[derive(Debug, Clone)]
struct TaskSpec {
    rule: RecurrenceRule,
    load: f64,
    context: String,
    active: bool,
}

fn arb_task_spec() -> impl Strategy<Value = TaskSpec> {
    (arb_rule(), 0u32..=20, arb_context(), prop::bool::weighted(0.85)).prop_map(
        |(rule, half_points, context, active)| TaskSpec {
            rule,
            load: f64::from(half_points) / 2.0,
            context,
            active,
        },
    )
}

fn arb_kind() -> impl Strategy<Value = ExceptionKind> {
    prop_oneof![
        Just(ExceptionKind::Suppress),
        (0u32..=10).prop_map(|load| ExceptionKind::OverrideLoad {
            load: f64::from(load)
        }),
        Just(ExceptionKind::ForceInclude),
    ]
}

/// `(task index, day offset, kind)`; the index is reduced modulo task count.
fn arb_exception_specs() -> impl Strategy<Value = Vec<(usize, u64, ExceptionKind)>> {
    prop::collection::vec((0usize..8, 0u64..RANGE_DAYS, arb_kind()), 0..12)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build(
    owner: Uuid,
    specs: &[TaskSpec],
    exception_specs: &[(usize, u64, ExceptionKind)],
) -> (Vec<Task>, Vec<TaskException>) {
    let tasks: Vec<Task> = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let mut task = Task::new(owner, format!("task {index}"), spec.load, spec.rule.clone())
                .with_context(spec.context.clone());
            task.active = spec.active;
            task
        })
        .collect();

    let mut seen = HashSet::new();
    let exceptions = exception_specs
        .iter()
        .filter_map(|(index, days, kind)| {
            let task = &tasks[index % tasks.len()];
            let day = offset(*days);
            // Storage keeps one exception per task and day.
            seen.insert((task.id, day))
                .then(|| TaskException::new(owner, task.id, day, *kind))
        })
        .collect();
    (tasks, exceptions)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn materialization_is_deterministic_sorted_and_unique(
        specs in prop::collection::vec(arb_task_spec(), 1..6),
        exception_specs in arb_exception_specs(),
    ) {
        let owner = Uuid::new_v4();
        let (tasks, exceptions) = build(owner, &specs, &exception_specs);
        let range = test_range();

        let first = materialize_rows(owner, range, &tasks, &exceptions, &[]);
        let second = materialize_rows(owner, range, &tasks, &exceptions, &[]);
        prop_assert_eq!(&first, &second);

        let mut keys = HashSet::new();
        for row in &first {
            prop_assert!(range.contains(row.target_date));
            prop_assert_eq!(row.owner_id, owner);
            prop_assert!((0.0..=10.0).contains(&row.load));
            prop_assert!(keys.insert((row.target_date, row.entry_key.clone())));
        }
        let mut sorted = first.clone();
        sorted.sort_by(|a, b| (a.target_date, &a.entry_key).cmp(&(b.target_date, &b.entry_key)));
        prop_assert_eq!(first, sorted);
    }

    #[test]
    fn without_exceptions_rows_follow_the_matcher(
        specs in prop::collection::vec(arb_task_spec(), 1..6),
    ) {
        let owner = Uuid::new_v4();
        let (tasks, _) = build(owner, &specs, &[]);
        let range = test_range();

        let rows = materialize_rows(owner, range, &tasks, &[], &[]);
        let actual: HashSet<(NaiveDate, String)> = rows
            .iter()
            .map(|row| (row.target_date, row.entry_key.clone()))
            .collect();
        let expected: HashSet<(NaiveDate, String)> = tasks
            .iter()
            .flat_map(|task| {
                range
                    .days()
                    .filter(move |day| matches(task, *day))
                    .map(move |day| (day, task.entry_key()))
            })
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(rows.iter().all(|row| row.origin == EntryOrigin::Rule));
    }

    #[test]
    fn suppress_always_wins(
        spec in arb_task_spec(),
        mut kinds in prop::collection::vec(arb_kind(), 0..4),
        position in 0usize..5,
        rule_matched in any::<bool>(),
    ) {
        let task = Task::new(Uuid::new_v4(), "any", spec.load, spec.rule);
        kinds.insert(position.min(kinds.len()), ExceptionKind::Suppress);
        prop_assert_eq!(resolve(&task, &kinds, rule_matched), Disposition::Absent);
    }

    #[test]
    fn suppressed_days_never_produce_rows(
        specs in prop::collection::vec(arb_task_spec(), 1..6),
        exception_specs in arb_exception_specs(),
    ) {
        let owner = Uuid::new_v4();
        let (tasks, exceptions) = build(owner, &specs, &exception_specs);
        let rows = materialize_rows(owner, test_range(), &tasks, &exceptions, &[]);

        for exception in exceptions.iter().filter(|e| e.kind == ExceptionKind::Suppress) {
            let key = exception.task_id.to_string();
            prop_assert!(!rows
                .iter()
                .any(|row| row.target_date == exception.target_date && row.entry_key == key));
        }
    }

    #[test]
    fn completions_only_change_status(
        specs in prop::collection::vec(arb_task_spec(), 1..6),
        completed_days in prop::collection::vec((0usize..8, 0u64..RANGE_DAYS), 0..10),
    ) {
        let owner = Uuid::new_v4();
        let (tasks, _) = build(owner, &specs, &[]);
        let completions: Vec<Completion> = completed_days
            .iter()
            .map(|(index, days)| Completion {
                task_id: tasks[index % tasks.len()].id,
                target_date: offset(*days),
            })
            .collect();

        let planned = materialize_rows(owner, test_range(), &tasks, &[], &[]);
        let tracked = materialize_rows(owner, test_range(), &tasks, &[], &completions);
        prop_assert_eq!(planned.len(), tracked.len());
        for (before, after) in planned.iter().zip(&tracked) {
            prop_assert_eq!(before.target_date, after.target_date);
            prop_assert_eq!(&before.entry_key, &after.entry_key);
            prop_assert_eq!(before.load, after.load);
            let done = completions.iter().any(|completion| {
                completion.target_date == after.target_date
                    && Some(completion.task_id) == after.task_id
            });
            let expected = if done { EntryStatus::Completed } else { EntryStatus::Planned };
            prop_assert_eq!(after.status, expected);
        }
    }
}
