//! Daily cache (materialized read model) persistence.
//!
//! # Responsibility
//! - Replace one recompute scope's rows over a date range atomically.
//! - Serve ordered range reads to the load calculator.
//!
//! # Invariants
//! - `replace_range` runs delete + insert inside one IMMEDIATE transaction;
//!   on any error the transaction rolls back and the previous rows survive.
//!   `replace_rows` does the same inside a transaction the caller owns.
//! - Reads are ordered by `(target_date, entry_key)`.

use crate::model::cache::{DailyCacheEntry, EntryOrigin, EntryStatus, RecomputeScope};
use crate::model::task::OwnerId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use crate::schedule::calendar::DateRange;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const CACHE_SELECT_SQL: &str = "SELECT
    owner_id,
    target_date,
    entry_key,
    task_id,
    task_name,
    context,
    resolved_load,
    status,
    origin
FROM daily_cache";

/// Row counts of one `replace_range` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

pub trait CacheRepository {
    /// Deletes every row of `scope` inside `range` and inserts `rows`.
    ///
    /// Every row must belong to `owner_id`, fall inside `range` and match
    /// `scope`; otherwise nothing is written.
    fn replace_range(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
        rows: &[DailyCacheEntry],
    ) -> RepoResult<ReplaceOutcome>;
    fn list_range(&self, owner_id: OwnerId, range: DateRange) -> RepoResult<Vec<DailyCacheEntry>>;
    fn list_for_date(&self, owner_id: OwnerId, date: NaiveDate) -> RepoResult<Vec<DailyCacheEntry>>;
    /// Drops rows dated strictly before `cutoff`. Returns the removed count.
    fn purge_before(&self, owner_id: OwnerId, cutoff: NaiveDate) -> RepoResult<usize>;
}

pub struct SqliteCacheRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCacheRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CacheRepository for SqliteCacheRepository<'_> {
    fn replace_range(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
        rows: &[DailyCacheEntry],
    ) -> RepoResult<ReplaceOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let outcome = replace_rows(&tx, owner_id, scope, range, rows)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn list_range(&self, owner_id: OwnerId, range: DateRange) -> RepoResult<Vec<DailyCacheEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{CACHE_SELECT_SQL}
             WHERE owner_id = ?1
               AND target_date >= ?2
               AND target_date <= ?3
             ORDER BY target_date ASC, entry_key ASC;"
        ))?;
        let mut rows = stmt.query(params![owner_id.to_string(), range.start, range.end])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_cache_row(row)?);
        }
        Ok(entries)
    }

    fn list_for_date(&self, owner_id: OwnerId, date: NaiveDate) -> RepoResult<Vec<DailyCacheEntry>> {
        self.list_range(owner_id, DateRange::single(date))
    }

    fn purge_before(&self, owner_id: OwnerId, cutoff: NaiveDate) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM daily_cache
             WHERE owner_id = ?1
               AND target_date < ?2;",
            params![owner_id.to_string(), cutoff],
        )?;
        Ok(removed)
    }
}

/// [`CacheRepository::replace_range`] inside a caller-owned transaction.
///
/// Lets a recompute read its source rows and rewrite the cache under one
/// write lock. The caller commits.
pub fn replace_rows(
    tx: &Transaction<'_>,
    owner_id: OwnerId,
    scope: RecomputeScope,
    range: DateRange,
    rows: &[DailyCacheEntry],
) -> RepoResult<ReplaceOutcome> {
    for row in rows {
        ensure_row_in_scope(row, owner_id, scope, range)?;
    }

    let deleted = match scope {
        RecomputeScope::All => tx.execute(
            "DELETE FROM daily_cache
             WHERE owner_id = ?1
               AND target_date >= ?2
               AND target_date <= ?3;",
            params![owner_id.to_string(), range.start, range.end],
        )?,
        RecomputeScope::Task(task_id) => tx.execute(
            "DELETE FROM daily_cache
             WHERE owner_id = ?1
               AND entry_key = ?2
               AND target_date >= ?3
               AND target_date <= ?4;",
            params![
                owner_id.to_string(),
                task_id.to_string(),
                range.start,
                range.end
            ],
        )?,
    };

    let mut inserted = 0;
    let mut stmt = tx.prepare_cached(
        "INSERT INTO daily_cache (
            owner_id, target_date, entry_key, task_id, task_name,
            context, resolved_load, status, origin
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
    )?;
    for row in rows {
        inserted += stmt.execute(params![
            row.owner_id.to_string(),
            row.target_date,
            row.entry_key,
            row.task_id.map(|value| value.to_string()),
            row.task_name,
            row.context,
            row.load,
            row.status.as_str(),
            row.origin.as_str(),
        ])?;
    }

    Ok(ReplaceOutcome { deleted, inserted })
}

fn ensure_row_in_scope(
    row: &DailyCacheEntry,
    owner_id: OwnerId,
    scope: RecomputeScope,
    range: DateRange,
) -> RepoResult<()> {
    if row.owner_id != owner_id {
        return Err(RepoError::InvalidData(format!(
            "cache row for owner {} written under owner {owner_id}",
            row.owner_id
        )));
    }
    if !range.contains(row.target_date) {
        return Err(RepoError::InvalidData(format!(
            "cache row dated {} outside recompute range {}..={}",
            row.target_date, range.start, range.end
        )));
    }
    if let RecomputeScope::Task(task_id) = scope {
        if row.entry_key != task_id.to_string() {
            return Err(RepoError::InvalidData(format!(
                "cache row `{}` outside task scope {task_id}",
                row.entry_key
            )));
        }
    }
    Ok(())
}

fn parse_cache_row(row: &Row<'_>) -> RepoResult<DailyCacheEntry> {
    let owner_text: String = row.get("owner_id")?;
    let task_text: Option<String> = row.get("task_id")?;
    let status_text: String = row.get("status")?;
    let origin_text: String = row.get("origin")?;

    let status = EntryStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in daily_cache.status"))
    })?;
    let origin = EntryOrigin::parse(&origin_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid origin `{origin_text}` in daily_cache.origin"))
    })?;
    let task_id = task_text
        .as_deref()
        .map(|value| parse_uuid(value, "daily_cache.task_id"))
        .transpose()?;

    Ok(DailyCacheEntry {
        owner_id: parse_uuid(&owner_text, "daily_cache.owner_id")?,
        target_date: row.get("target_date")?,
        entry_key: row.get("entry_key")?,
        task_id,
        task_name: row.get("task_name")?,
        context: row.get("context")?,
        load: row.get("resolved_load")?,
        status,
        origin,
    })
}
