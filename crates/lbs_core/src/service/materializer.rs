//! Cache materializer.
//!
//! # Responsibility
//! - Expand tasks, exceptions and completions into daily cache rows.
//! - Replace one scope's rows over a date range in a single transaction.
//!
//! # Invariants
//! - [`materialize_rows`] is pure: same inputs, same rows, same order.
//! - Rows carry no timestamps, so re-running a recompute over unchanged
//!   source data rewrites identical rows.
//! - Inactive tasks produce no rows, forced or not.
//! - Source reads and the cache rewrite share one IMMEDIATE transaction, so
//!   a writer on another connection cannot commit between them.

use crate::model::cache::{DailyCacheEntry, EntryOrigin, EntryStatus, RecomputeScope};
use crate::model::exception::{ExceptionKind, TaskException};
use crate::model::task::{OwnerId, Task, TaskId};
use crate::repo::cache_repo::replace_rows;
use crate::repo::completion_repo::{Completion, CompletionRepository, SqliteCompletionRepository};
use crate::repo::exception_repo::{ExceptionRepository, SqliteExceptionRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskListQuery, TaskRepository};
use crate::repo::RepoResult;
use crate::schedule::calendar::DateRange;
use crate::schedule::matcher::matches;
use crate::schedule::resolver::{resolve, Disposition};
use chrono::NaiveDate;
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Summary of one executed recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeReport {
    pub owner_id: OwnerId,
    pub scope: RecomputeScope,
    pub range: DateRange,
    pub tasks_considered: usize,
    pub rows_deleted: usize,
    pub rows_written: usize,
    pub duration_ms: u128,
}

/// Expands `tasks` over `range` into sorted cache rows.
///
/// `exceptions` and `completions` may contain entries for other tasks or
/// dates; only those matching a `(task, date)` pair in the expansion apply.
pub fn materialize_rows(
    owner_id: OwnerId,
    range: DateRange,
    tasks: &[Task],
    exceptions: &[TaskException],
    completions: &[Completion],
) -> Vec<DailyCacheEntry> {
    let mut exceptions_by_day: HashMap<(TaskId, NaiveDate), Vec<ExceptionKind>> = HashMap::new();
    for exception in exceptions {
        exceptions_by_day
            .entry((exception.task_id, exception.target_date))
            .or_default()
            .push(exception.kind);
    }
    let completed: HashSet<(TaskId, NaiveDate)> = completions
        .iter()
        .map(|completion| (completion.task_id, completion.target_date))
        .collect();

    let mut rows = Vec::new();
    for task in tasks
        .iter()
        .filter(|task| task.owner_id == owner_id && task.active)
    {
        for date in range.days() {
            let rule_matched = matches(task, date);
            let kinds = exceptions_by_day
                .get(&(task.id, date))
                .map(Vec::as_slice)
                .unwrap_or_default();
            if !rule_matched && kinds.is_empty() {
                continue;
            }

            let Disposition::Present { load, origin } = resolve(task, kinds, rule_matched) else {
                continue;
            };
            let status = if completed.contains(&(task.id, date)) {
                EntryStatus::Completed
            } else {
                EntryStatus::Planned
            };
            rows.push(DailyCacheEntry {
                owner_id,
                target_date: date,
                entry_key: task.entry_key(),
                // Ad-hoc forced rows are not backed by a rule occurrence.
                task_id: (origin != EntryOrigin::Forced || rule_matched).then_some(task.id),
                task_name: task.name.trim().to_string(),
                context: task.context_tag().to_string(),
                load,
                status,
                origin,
            });
        }
    }

    rows.sort_by(|left, right| {
        left.target_date
            .cmp(&right.target_date)
            .then_with(|| left.entry_key.cmp(&right.entry_key))
    });
    rows
}

/// Connection-bound executor for recomputes.
///
/// Each call holds the database write lock from its first source read until
/// the cache rows are committed. That holds across connections and
/// processes; [`crate::service::recompute_queue::RecomputeCoordinator`] only
/// adds in-process ordering and coalescing on top.
pub struct CacheMaterializer<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CacheMaterializer<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Recomputes `scope` over `range` and atomically replaces its rows.
    ///
    /// # Errors
    /// - Any read or write failure. Nothing is replaced in that case.
    pub fn recompute(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
    ) -> RepoResult<RecomputeReport> {
        let started_at = Instant::now();
        match self.recompute_inner(owner_id, scope, range, started_at) {
            Ok(report) => {
                info!(
                    "event=cache_recompute module=materializer status=ok owner_id={} scope={} start={} end={} tasks={} deleted={} written={} duration_ms={}",
                    owner_id,
                    scope_label(scope),
                    range.start,
                    range.end,
                    report.tasks_considered,
                    report.rows_deleted,
                    report.rows_written,
                    report.duration_ms
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=cache_recompute module=materializer status=error owner_id={} scope={} start={} end={} duration_ms={} retryable={} error={}",
                    owner_id,
                    scope_label(scope),
                    range.start,
                    range.end,
                    started_at.elapsed().as_millis(),
                    err.is_retryable(),
                    err
                );
                Err(err)
            }
        }
    }

    fn recompute_inner(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
        started_at: Instant,
    ) -> RepoResult<RecomputeReport> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let task_repo = SqliteTaskRepository::new(&tx);
        let tasks = match scope {
            RecomputeScope::All => task_repo.list_tasks(&TaskListQuery::active(owner_id))?,
            RecomputeScope::Task(task_id) => task_repo
                .get_task(owner_id, task_id)?
                .into_iter()
                .collect(),
        };
        let scoped_task = match scope {
            RecomputeScope::All => None,
            RecomputeScope::Task(task_id) => Some(task_id),
        };

        let exceptions = SqliteExceptionRepository::new(&tx).list_exceptions(
            owner_id,
            scoped_task,
            Some(range),
        )?;
        let completions =
            SqliteCompletionRepository::new(&tx).list_completions(owner_id, range)?;

        let rows = materialize_rows(owner_id, range, &tasks, &exceptions, &completions);
        let outcome = replace_rows(&tx, owner_id, scope, range, &rows)?;
        tx.commit()?;

        Ok(RecomputeReport {
            owner_id,
            scope,
            range,
            tasks_considered: tasks.len(),
            rows_deleted: outcome.deleted,
            rows_written: outcome.inserted,
            duration_ms: started_at.elapsed().as_millis(),
        })
    }
}

pub(crate) fn scope_label(scope: RecomputeScope) -> String {
    match scope {
        RecomputeScope::All => "all".to_string(),
        RecomputeScope::Task(task_id) => format!("task:{task_id}"),
    }
}
