//! Load balancing engine core.
//!
//! Turns recurring task rules into a dated, materialized schedule and scores
//! each day's cognitive load against per-owner coefficients.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{resolve_db_path, EngineSettings};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{
    default_log_level, init_logging, init_logging_from_env, logging_status, LoggingError,
};
pub use model::cache::{DailyCacheEntry, EntryOrigin, EntryStatus, RecomputeScope};
pub use model::coefficients::{CoefficientPatch, CoefficientSet, Coefficients};
pub use model::exception::{ExceptionId, ExceptionKind, TaskException};
pub use model::task::{
    NthWeekday, OwnerId, RecurrenceRule, Task, TaskId, TaskPatch, TaskValidationError, WeekdaySet,
};
pub use repo::task_repo::TaskListQuery;
pub use repo::{RepoError, RepoResult};
pub use schedule::calendar::DateRange;
pub use service::clock::{Clock, FixedClock, SystemClock};
pub use service::engine::{LbsEngine, RecomputeAck, RefreshReport};
pub use service::load::{
    ContextLoad, DailyLoad, LoadEntry, LoadLevel, LoadSnapshot, TrendBucket, WeeklyStats,
};
pub use service::materializer::RecomputeReport;
pub use service::recompute_queue::RecomputeCoordinator;
pub use service::{EngineError, EngineResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
