#![allow(dead_code)]

use chrono::NaiveDate;
use lbs_core::{
    DailyCacheEntry, DateRange, EngineSettings, FixedClock, LbsEngine, OwnerId,
    RecomputeCoordinator,
};
use lbs_core::repo::cache_repo::{CacheRepository, SqliteCacheRepository};
use rusqlite::Connection;
use std::sync::Arc;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange::new(start, end).unwrap()
}

/// Short horizon around `as_of` so tests stay fast: 10 days back, 60 ahead.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        horizon_past_days: 10,
        horizon_future_days: 60,
        auto_flush: true,
    }
}

pub fn engine_at(conn: &Connection, as_of: NaiveDate) -> LbsEngine<'_> {
    engine_with(conn, as_of, test_settings(), Arc::new(RecomputeCoordinator::new()))
}

pub fn engine_with(
    conn: &Connection,
    as_of: NaiveDate,
    settings: EngineSettings,
    coordinator: Arc<RecomputeCoordinator>,
) -> LbsEngine<'_> {
    LbsEngine::with_parts(conn, settings, coordinator, Arc::new(FixedClock(as_of))).unwrap()
}

pub fn cache_rows(conn: &Connection, owner: OwnerId, range: DateRange) -> Vec<DailyCacheEntry> {
    SqliteCacheRepository::new(conn)
        .list_range(owner, range)
        .unwrap()
}

pub fn cache_dates(conn: &Connection, owner: OwnerId, range: DateRange) -> Vec<NaiveDate> {
    cache_rows(conn, owner, range)
        .into_iter()
        .map(|row| row.target_date)
        .collect()
}
