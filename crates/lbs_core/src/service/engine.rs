//! Load balancing engine facade.
//!
//! # Responsibility
//! - Expose the CRUD entry points that keep the daily cache in sync.
//! - Expose dashboard queries computed from the cache only.
//! - Route every cache rebuild through the shared [`RecomputeCoordinator`].
//!
//! # Invariants
//! - Source writes (tasks, exceptions, completions) commit before their
//!   recompute request is queued.
//! - Queued recomputes run under the owner lock, one transaction each.
//! - A failed recompute is put back on the queue; the caller gets a
//!   retryable error and the previous cache rows stay readable.
//! - Load queries never read rules or exceptions.

use crate::config::EngineSettings;
use crate::model::cache::RecomputeScope;
use crate::model::coefficients::{CoefficientPatch, CoefficientSet};
use crate::model::exception::{ExceptionId, TaskException};
use crate::model::task::{OwnerId, Task, TaskId, TaskPatch};
use crate::repo::cache_repo::{CacheRepository, SqliteCacheRepository};
use crate::repo::coefficient_repo::SqliteCoefficientRepository;
use crate::repo::completion_repo::{CompletionRepository, SqliteCompletionRepository};
use crate::repo::ensure_schema_ready;
use crate::repo::exception_repo::{ExceptionRepository, SqliteExceptionRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskListQuery, TaskRepository};
use crate::schedule::calendar::DateRange;
use crate::service::clock::{Clock, SystemClock};
use crate::service::coefficient_service::CoefficientService;
use crate::service::load::{
    self, calculate_day, daily_loads, ContextLoad, DailyLoad, LoadSnapshot, TrendBucket,
    WeeklyStats,
};
use crate::service::materializer::{scope_label, CacheMaterializer, RecomputeReport};
use crate::service::recompute_queue::{RecomputeCoordinator, RecomputeRequest};
use crate::service::{EngineError, EngineResult};
use chrono::{Days, NaiveDate};
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Result of [`LbsEngine::trigger_recompute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeAck {
    pub owner_id: OwnerId,
    pub scope: RecomputeScope,
    /// Requested range clamped to the horizon; `None` when nothing of the
    /// request overlaps the horizon.
    pub range: Option<DateRange>,
    /// Queue sequence of the request, `None` when nothing was queued.
    pub sequence: Option<u64>,
    /// Recomputes executed by this call (empty when flushing is deferred).
    pub reports: Vec<RecomputeReport>,
}

/// Result of one owner's horizon refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub owner_id: OwnerId,
    pub horizon: DateRange,
    pub reports: Vec<RecomputeReport>,
    /// Cache rows dated before the horizon that were dropped.
    pub purged_rows: usize,
}

pub struct LbsEngine<'conn> {
    conn: &'conn Connection,
    settings: EngineSettings,
    coordinator: Arc<RecomputeCoordinator>,
    clock: Arc<dyn Clock>,
}

impl<'conn> LbsEngine<'conn> {
    /// Creates an engine with default settings, a private coordinator and
    /// the system clock.
    ///
    /// # Errors
    /// - Returns an error when `conn` has not been opened through
    ///   `db::open_db*`.
    pub fn try_new(conn: &'conn Connection) -> EngineResult<Self> {
        Self::with_parts(
            conn,
            EngineSettings::default(),
            Arc::new(RecomputeCoordinator::new()),
            Arc::new(SystemClock),
        )
    }

    /// Creates an engine sharing `coordinator` with other engines.
    pub fn with_parts(
        conn: &'conn Connection,
        settings: EngineSettings,
        coordinator: Arc<RecomputeCoordinator>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            settings,
            coordinator,
            clock,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &Arc<RecomputeCoordinator> {
        &self.coordinator
    }

    /// Date the horizon is anchored at.
    pub fn as_of(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn horizon(&self) -> DateRange {
        self.settings.horizon(self.as_of())
    }

    // ---- task CRUD ----

    /// Stores a new task and materializes it over the horizon.
    pub fn create_task(&self, task: &Task) -> EngineResult<Task> {
        SqliteTaskRepository::new(self.conn).create_task(task)?;
        let stored = self.require_task(task.owner_id, task.id)?;
        info!(
            "event=task_create module=engine status=ok owner_id={} task_id={} rule={}",
            stored.owner_id,
            stored.id,
            stored.rule.kind().as_str()
        );
        self.schedule(stored.owner_id, RecomputeScope::Task(stored.id), self.horizon())?;
        Ok(stored)
    }

    /// Applies `patch` to an existing task.
    ///
    /// Patches that only touch notes or the sync id skip the recompute.
    pub fn update_task(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> EngineResult<Task> {
        let mut task = self.require_task(owner_id, task_id)?;
        patch.apply_to(&mut task);
        SqliteTaskRepository::new(self.conn).update_task(&task)?;
        info!(
            "event=task_update module=engine status=ok owner_id={} task_id={} touches_cache={}",
            owner_id,
            task_id,
            patch.touches_cache()
        );
        if patch.touches_cache() {
            self.schedule(owner_id, RecomputeScope::Task(task_id), self.horizon())?;
        }
        self.require_task(owner_id, task_id)
    }

    /// Marks a task inactive and removes its cache rows over the horizon.
    pub fn deactivate_task(&self, owner_id: OwnerId, task_id: TaskId) -> EngineResult<Task> {
        let mut task = self.require_task(owner_id, task_id)?;
        if !task.active {
            return Ok(task);
        }
        task.deactivate();
        SqliteTaskRepository::new(self.conn).update_task(&task)?;
        info!(
            "event=task_deactivate module=engine status=ok owner_id={} task_id={}",
            owner_id, task_id
        );
        self.schedule(owner_id, RecomputeScope::Task(task_id), self.horizon())?;
        Ok(task)
    }

    pub fn get_task(&self, owner_id: OwnerId, task_id: TaskId) -> EngineResult<Option<Task>> {
        Ok(SqliteTaskRepository::new(self.conn).get_task(owner_id, task_id)?)
    }

    pub fn list_tasks(&self, query: &TaskListQuery) -> EngineResult<Vec<Task>> {
        Ok(SqliteTaskRepository::new(self.conn).list_tasks(query)?)
    }

    // ---- exceptions ----

    /// Stores an exception, replacing any existing one for the same
    /// `(task, date)`, and recomputes that single day.
    ///
    /// # Errors
    /// - `TaskNotFound` when the task does not exist under the owner.
    /// - `TaskInactive` when the task is deactivated.
    pub fn create_exception(&self, exception: &TaskException) -> EngineResult<TaskException> {
        let task = self.require_task(exception.owner_id, exception.task_id)?;
        if !task.active {
            return Err(EngineError::TaskInactive(task.id));
        }
        let stored = SqliteExceptionRepository::new(self.conn).upsert_exception(exception)?;
        info!(
            "event=exception_upsert module=engine status=ok owner_id={} task_id={} exception_id={} date={} type={} replaced={}",
            stored.owner_id,
            stored.task_id,
            stored.id,
            stored.target_date,
            stored.kind.as_str(),
            stored.id != exception.id
        );
        self.schedule(
            stored.owner_id,
            RecomputeScope::Task(stored.task_id),
            DateRange::single(stored.target_date),
        )?;
        Ok(stored)
    }

    /// Removes an exception and recomputes its day.
    pub fn delete_exception(
        &self,
        owner_id: OwnerId,
        exception_id: ExceptionId,
    ) -> EngineResult<TaskException> {
        let removed = SqliteExceptionRepository::new(self.conn)
            .delete_exception(owner_id, exception_id)?
            .ok_or(EngineError::ExceptionNotFound(exception_id))?;
        info!(
            "event=exception_delete module=engine status=ok owner_id={} task_id={} exception_id={} date={}",
            owner_id, removed.task_id, exception_id, removed.target_date
        );
        self.schedule(
            owner_id,
            RecomputeScope::Task(removed.task_id),
            DateRange::single(removed.target_date),
        )?;
        Ok(removed)
    }

    pub fn list_exceptions(
        &self,
        owner_id: OwnerId,
        task_id: Option<TaskId>,
        range: Option<DateRange>,
    ) -> EngineResult<Vec<TaskException>> {
        Ok(SqliteExceptionRepository::new(self.conn).list_exceptions(owner_id, task_id, range)?)
    }

    // ---- completions ----

    /// Marks one occurrence completed. Returns `false` when it already was.
    pub fn complete_occurrence(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        date: NaiveDate,
    ) -> EngineResult<bool> {
        self.require_task(owner_id, task_id)?;
        let changed =
            SqliteCompletionRepository::new(self.conn).mark_completed(owner_id, task_id, date)?;
        if changed {
            self.schedule(owner_id, RecomputeScope::Task(task_id), DateRange::single(date))?;
        }
        Ok(changed)
    }

    /// Clears a completion mark. Returns `false` when there was none.
    pub fn reopen_occurrence(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        date: NaiveDate,
    ) -> EngineResult<bool> {
        let changed =
            SqliteCompletionRepository::new(self.conn).clear_completed(owner_id, task_id, date)?;
        if changed {
            self.schedule(owner_id, RecomputeScope::Task(task_id), DateRange::single(date))?;
        }
        Ok(changed)
    }

    // ---- recompute ----

    /// Queues a recompute for one task (or the whole owner when `task_id` is
    /// `None`) over `range` (default: the horizon), then flushes when
    /// `auto_flush` is on.
    ///
    /// # Errors
    /// - `TaskNotFound` when `task_id` does not exist under the owner.
    pub fn trigger_recompute(
        &self,
        owner_id: OwnerId,
        task_id: Option<TaskId>,
        range: Option<DateRange>,
    ) -> EngineResult<RecomputeAck> {
        if let Some(task_id) = task_id {
            self.require_task(owner_id, task_id)?;
        }
        let scope = task_id.map_or(RecomputeScope::All, RecomputeScope::Task);
        let range = range.unwrap_or_else(|| self.horizon());
        let clamped = range.intersect(&self.horizon());
        let request = self.enqueue(owner_id, scope, range);
        let reports = if self.settings.auto_flush {
            self.flush_pending(owner_id)?
        } else {
            Vec::new()
        };
        Ok(RecomputeAck {
            owner_id,
            scope,
            range: clamped,
            sequence: request.map(|request| request.sequence),
            reports,
        })
    }

    /// Executes every queued recompute of `owner_id` under the owner lock.
    ///
    /// On failure the failing request and all not-yet-run requests go back
    /// on the queue.
    pub fn flush_pending(&self, owner_id: OwnerId) -> EngineResult<Vec<RecomputeReport>> {
        self.coordinator.with_owner_lock(owner_id, || {
            let materializer = CacheMaterializer::new(self.conn);
            let requests = self.coordinator.take_pending(owner_id);
            let mut reports = Vec::with_capacity(requests.len());
            for (index, request) in requests.iter().enumerate() {
                match materializer.recompute(request.owner_id, request.scope, request.range) {
                    Ok(report) => reports.push(report),
                    Err(err) => {
                        warn!(
                            "event=recompute_requeue module=engine status=error owner_id={} scope={} requeued={}",
                            owner_id,
                            scope_label(request.scope),
                            requests.len() - index
                        );
                        self.coordinator.requeue(requests[index..].iter().copied());
                        return Err(err.into());
                    }
                }
            }
            Ok(reports)
        })
    }

    /// Drains the queue of every owner with pending requests.
    ///
    /// Stops at the first failing owner; its requests and those of owners
    /// not reached yet stay queued.
    pub fn flush_all_pending(&self) -> EngineResult<Vec<RecomputeReport>> {
        let mut reports = Vec::new();
        for owner_id in self.coordinator.pending_owners() {
            reports.extend(self.flush_pending(owner_id)?);
        }
        Ok(reports)
    }

    /// Rebuilds the owner's whole horizon and drops rows older than it.
    pub fn refresh_horizon(&self, owner_id: OwnerId) -> EngineResult<RefreshReport> {
        let horizon = self.horizon();
        self.coordinator.enqueue(owner_id, RecomputeScope::All, horizon);
        let reports = self.flush_pending(owner_id)?;
        let purged_rows = self.coordinator.with_owner_lock(owner_id, || {
            SqliteCacheRepository::new(self.conn).purge_before(owner_id, horizon.start)
        })?;
        info!(
            "event=horizon_refresh module=engine status=ok owner_id={} start={} end={} recomputes={} purged={}",
            owner_id,
            horizon.start,
            horizon.end,
            reports.len(),
            purged_rows
        );
        Ok(RefreshReport {
            owner_id,
            horizon,
            reports,
            purged_rows,
        })
    }

    /// Runs [`Self::refresh_horizon`] for every owner that has tasks.
    pub fn refresh_all_owners(&self) -> EngineResult<Vec<RefreshReport>> {
        let owners = SqliteTaskRepository::new(self.conn).list_owner_ids()?;
        owners
            .into_iter()
            .map(|owner_id| self.refresh_horizon(owner_id))
            .collect()
    }

    // ---- dashboard queries ----

    /// Load snapshot for one day, read from the cache only.
    pub fn calculate_load(&self, owner_id: OwnerId, date: NaiveDate) -> EngineResult<LoadSnapshot> {
        let started_at = Instant::now();
        let coefficients = self.current_coefficients(owner_id)?;
        let rows = SqliteCacheRepository::new(self.conn).list_for_date(owner_id, date)?;
        let snapshot = calculate_day(owner_id, date, &rows, &coefficients);
        info!(
            "event=load_calculate module=engine status=ok owner_id={} date={} n={} u={} adjusted={:.3} level={} duration_ms={}",
            owner_id,
            date,
            snapshot.task_count,
            snapshot.context_count,
            snapshot.adjusted_load,
            snapshot.level.as_str(),
            started_at.elapsed().as_millis()
        );
        Ok(snapshot)
    }

    /// One [`DailyLoad`] per day from `start` to `end` inclusive.
    pub fn get_cache_range(
        &self,
        owner_id: OwnerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<DailyLoad>> {
        let range = checked_range(start, end)?;
        let coefficients = self.current_coefficients(owner_id)?;
        let rows = SqliteCacheRepository::new(self.conn).list_range(owner_id, range)?;
        Ok(daily_loads(owner_id, range, &rows, &coefficients))
    }

    /// Statistics for the seven days starting at `week_start`.
    pub fn weekly_stats(&self, owner_id: OwnerId, week_start: NaiveDate) -> EngineResult<WeeklyStats> {
        let week_end = week_start
            .checked_add_days(Days::new(6))
            .ok_or(EngineError::InvalidRange {
                start: week_start,
                end: NaiveDate::MAX,
            })?;
        let days = self.get_cache_range(owner_id, week_start, week_end)?;
        load::weekly_stats(days).ok_or(EngineError::InvalidRange {
            start: week_start,
            end: week_end,
        })
    }

    /// Consecutive 7-day buckets from `start`; the last one stops at `end`.
    pub fn load_trends(
        &self,
        owner_id: OwnerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<TrendBucket>> {
        let days = self.get_cache_range(owner_id, start, end)?;
        Ok(load::load_trends(&days))
    }

    /// Counted load per `(date, context)` in the range.
    pub fn context_distribution(
        &self,
        owner_id: OwnerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<ContextLoad>> {
        let range = checked_range(start, end)?;
        let rows = SqliteCacheRepository::new(self.conn).list_range(owner_id, range)?;
        Ok(load::context_distribution(&rows))
    }

    // ---- coefficients ----

    pub fn current_coefficients(&self, owner_id: OwnerId) -> EngineResult<CoefficientSet> {
        Ok(self.coefficient_service().current(owner_id)?)
    }

    /// Stores a new coefficient version. The cache is untouched.
    pub fn update_coefficients(
        &self,
        owner_id: OwnerId,
        patch: &CoefficientPatch,
    ) -> EngineResult<CoefficientSet> {
        Ok(self.coefficient_service().update(owner_id, patch)?)
    }

    pub fn coefficient_history(&self, owner_id: OwnerId) -> EngineResult<Vec<CoefficientSet>> {
        Ok(self.coefficient_service().history(owner_id)?)
    }

    // ---- internals ----

    fn coefficient_service(&self) -> CoefficientService<SqliteCoefficientRepository<'conn>> {
        CoefficientService::new(SqliteCoefficientRepository::new(self.conn))
    }

    fn require_task(&self, owner_id: OwnerId, task_id: TaskId) -> EngineResult<Task> {
        SqliteTaskRepository::new(self.conn)
            .get_task(owner_id, task_id)?
            .ok_or(EngineError::TaskNotFound(task_id))
    }

    /// Queues the horizon-clamped part of `range`, if any.
    fn enqueue(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
    ) -> Option<RecomputeRequest> {
        let clamped = range.intersect(&self.horizon())?;
        Some(self.coordinator.enqueue(owner_id, scope, clamped))
    }

    /// Queues a mutation-driven recompute and flushes when configured to.
    fn schedule(&self, owner_id: OwnerId, scope: RecomputeScope, range: DateRange) -> EngineResult<()> {
        if self.enqueue(owner_id, scope, range).is_some() && self.settings.auto_flush {
            self.flush_pending(owner_id)?;
        }
        Ok(())
    }
}

fn checked_range(start: NaiveDate, end: NaiveDate) -> EngineResult<DateRange> {
    DateRange::new(start, end).ok_or(EngineError::InvalidRange { start, end })
}
