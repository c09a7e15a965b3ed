mod common;

use common::{cache_rows, date, engine_at};
use lbs_core::db::open_db_in_memory;
use lbs_core::{CoefficientPatch, EngineError, LoadLevel, RecurrenceRule, Task};
use uuid::Uuid;

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-9
}

#[test]
fn four_tasks_in_two_contexts_are_critical() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    let day = date(2025, 3, 3);
    for (name, load, context) in [
        ("Report", 2.0, "work"),
        ("Review", 3.0, "work"),
        ("Groceries", 1.5, "home"),
        ("Laundry", 2.5, "home"),
    ] {
        engine
            .create_task(&Task::new(owner, name, load, RecurrenceRule::once(day)).with_context(context))
            .unwrap();
    }

    let snapshot = engine.calculate_load(owner, day).unwrap();
    assert_eq!(snapshot.base_load, 9.0);
    assert_eq!(snapshot.task_count, 4);
    assert_eq!(snapshot.context_count, 2);
    assert!(close(snapshot.count_penalty, 0.1 * 4f64.powf(1.2)));
    assert_eq!(snapshot.switch_penalty, 0.5);
    assert!((snapshot.adjusted_load - 10.028).abs() < 0.001);
    assert_eq!(snapshot.level, LoadLevel::Critical);
    assert!(snapshot.overflow);
    assert_eq!(snapshot.coefficients_version, 0);
    assert_eq!(snapshot.entries.len(), 4);
}

#[test]
fn empty_day_is_safe_with_zero_load() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));

    let snapshot = engine.calculate_load(Uuid::new_v4(), date(2025, 3, 2)).unwrap();
    assert_eq!(snapshot.adjusted_load, 0.0);
    assert_eq!(snapshot.count_penalty, 0.0);
    assert_eq!(snapshot.level, LoadLevel::Safe);
    assert!(snapshot.entries.is_empty());
}

#[test]
fn band_edges_follow_thresholds_and_cap() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    engine
        .update_coefficients(
            owner,
            &CoefficientPatch {
                alpha: Some(0.0),
                switch_cost: Some(0.0),
                ..CoefficientPatch::default()
            },
        )
        .unwrap();
    let warning_day = date(2025, 3, 4);
    let danger_day = date(2025, 3, 5);
    engine
        .create_task(&Task::new(owner, "Deep work", 6.0, RecurrenceRule::once(warning_day)))
        .unwrap();
    engine
        .create_task(&Task::new(owner, "Offsite", 8.0, RecurrenceRule::once(danger_day)))
        .unwrap();

    let warning = engine.calculate_load(owner, warning_day).unwrap();
    assert_eq!(warning.adjusted_load, 6.0);
    assert_eq!(warning.level, LoadLevel::Warning);

    let danger = engine.calculate_load(owner, danger_day).unwrap();
    assert_eq!(danger.adjusted_load, 8.0);
    assert_eq!(danger.level, LoadLevel::Danger);
    assert!(!danger.overflow);

    engine
        .update_coefficients(
            owner,
            &CoefficientPatch {
                cap: Some(7.5),
                ..CoefficientPatch::default()
            },
        )
        .unwrap();
    let lowered = engine.calculate_load(owner, danger_day).unwrap();
    assert_eq!(lowered.level, LoadLevel::Critical);
    assert!(lowered.overflow);
    assert_eq!(lowered.cap, 7.5);
    assert_eq!(lowered.coefficients_version, 2);
}

#[test]
fn coefficient_updates_leave_cache_untouched() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    let day = date(2025, 3, 3);
    engine
        .create_task(&Task::new(owner, "Plan", 3.0, RecurrenceRule::once(day)))
        .unwrap();
    let before = cache_rows(&conn, owner, engine.horizon());
    let default_load = engine.calculate_load(owner, day).unwrap().adjusted_load;

    let stored = engine
        .update_coefficients(
            owner,
            &CoefficientPatch {
                alpha: Some(1.0),
                ..CoefficientPatch::default()
            },
        )
        .unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(engine.coordinator().pending_count(owner), 0);
    assert_eq!(cache_rows(&conn, owner, engine.horizon()), before);

    let tuned = engine.calculate_load(owner, day).unwrap();
    assert!(close(default_load, 3.1));
    assert!(close(tuned.adjusted_load, 4.0));
    assert_eq!(tuned.coefficients_version, 1);
}

#[test]
fn cache_range_returns_every_day_and_rejects_inverted_ranges() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    engine
        .create_task(&Task::new(owner, "Walk", 1.0, RecurrenceRule::once(date(2025, 3, 3))))
        .unwrap();

    let days = engine
        .get_cache_range(owner, date(2025, 3, 1), date(2025, 3, 5))
        .unwrap();
    assert_eq!(days.len(), 5);
    assert_eq!(days[0].date, date(2025, 3, 1));
    assert_eq!(days[4].date, date(2025, 3, 5));
    assert_eq!(
        days.iter().map(|day| day.task_count).collect::<Vec<_>>(),
        vec![0, 0, 1, 0, 0]
    );

    let err = engine
        .get_cache_range(owner, date(2025, 3, 5), date(2025, 3, 1))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange { .. }));
    assert!(!err.is_retryable());
}

fn seed_week(engine: &lbs_core::LbsEngine<'_>, owner: Uuid) {
    engine
        .create_task(
            &Task::new(
                owner,
                "Commute",
                3.0,
                RecurrenceRule::every_n_days(date(2025, 1, 1), 1).unwrap(),
            )
            .with_context("a"),
        )
        .unwrap();
    engine
        .create_task(&Task::new(owner, "Launch", 6.0, RecurrenceRule::once(date(2025, 3, 4))).with_context("b"))
        .unwrap();
    engine
        .create_task(&Task::new(owner, "Dentist", 2.0, RecurrenceRule::once(date(2025, 3, 6))).with_context("a"))
        .unwrap();
}

#[test]
fn weekly_stats_count_overflow_and_recovery_days() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    seed_week(&engine, owner);

    let stats = engine.weekly_stats(owner, date(2025, 3, 3)).unwrap();
    assert_eq!(stats.start_date, date(2025, 3, 3));
    assert_eq!(stats.end_date, date(2025, 3, 9));
    assert_eq!(stats.daily_loads.len(), 7);
    assert_eq!(stats.over_days, 1);
    assert_eq!(stats.recovery_days, 5);
    assert_eq!(stats.recovery_rate, 71.4);
    assert_eq!(stats.average_load, 4.35);
}

#[test]
fn trends_bucket_by_week() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    seed_week(&engine, owner);

    let buckets = engine
        .load_trends(owner, date(2025, 3, 3), date(2025, 3, 18))
        .unwrap();
    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[0].start_date, date(2025, 3, 3));
    assert_eq!(buckets[0].end_date, date(2025, 3, 9));
    assert_eq!(buckets[0].average_load, 4.35);
    assert!(close(buckets[0].min_load, 3.1));
    assert!(buckets[0].max_load > 9.7);
    assert!(close(buckets[1].average_load, 3.1));
    assert_eq!(buckets[2].start_date, date(2025, 3, 17));
    assert_eq!(buckets[2].end_date, date(2025, 3, 18));
}

#[test]
fn context_distribution_sums_per_day_and_tag() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine_at(&conn, date(2025, 3, 1));
    let owner = Uuid::new_v4();
    seed_week(&engine, owner);

    let distribution = engine
        .context_distribution(owner, date(2025, 3, 4), date(2025, 3, 6))
        .unwrap();
    let summary: Vec<(chrono::NaiveDate, &str, f64, usize)> = distribution
        .iter()
        .map(|slot| (slot.date, slot.context.as_str(), slot.load, slot.task_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            (date(2025, 3, 4), "a", 3.0, 1),
            (date(2025, 3, 4), "b", 6.0, 1),
            (date(2025, 3, 5), "a", 3.0, 1),
            (date(2025, 3, 6), "a", 5.0, 2),
        ]
    );
}
