//! Occurrence completion marks.
//!
//! Completions are source data: the materializer replays them into the
//! `status` column of cache rows, so the cache stays reconstructible.

use crate::model::task::{OwnerId, TaskId};
use crate::repo::{parse_uuid, RepoResult};
use crate::schedule::calendar::DateRange;
use chrono::NaiveDate;
use rusqlite::{params, Connection};

/// One completed `(task, date)` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Completion {
    pub task_id: TaskId,
    pub target_date: NaiveDate,
}

pub trait CompletionRepository {
    /// Returns `true` when a new mark was written.
    fn mark_completed(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        target_date: NaiveDate,
    ) -> RepoResult<bool>;
    /// Returns `true` when an existing mark was removed.
    fn clear_completed(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        target_date: NaiveDate,
    ) -> RepoResult<bool>;
    fn list_completions(&self, owner_id: OwnerId, range: DateRange) -> RepoResult<Vec<Completion>>;
}

pub struct SqliteCompletionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCompletionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CompletionRepository for SqliteCompletionRepository<'_> {
    fn mark_completed(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        target_date: NaiveDate,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO task_completions (owner_id, task_id, target_date)
             VALUES (?1, ?2, ?3);",
            params![owner_id.to_string(), task_id.to_string(), target_date],
        )?;
        Ok(changed > 0)
    }

    fn clear_completed(
        &self,
        owner_id: OwnerId,
        task_id: TaskId,
        target_date: NaiveDate,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM task_completions
             WHERE owner_id = ?1
               AND task_id = ?2
               AND target_date = ?3;",
            params![owner_id.to_string(), task_id.to_string(), target_date],
        )?;
        Ok(changed > 0)
    }

    fn list_completions(&self, owner_id: OwnerId, range: DateRange) -> RepoResult<Vec<Completion>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, target_date
             FROM task_completions
             WHERE owner_id = ?1
               AND target_date >= ?2
               AND target_date <= ?3
             ORDER BY target_date ASC, task_id ASC;",
        )?;
        let mut rows = stmt.query(params![owner_id.to_string(), range.start, range.end])?;
        let mut completions = Vec::new();
        while let Some(row) = rows.next()? {
            let task_text: String = row.get(0)?;
            completions.push(Completion {
                task_id: parse_uuid(&task_text, "task_completions.task_id")?,
                target_date: row.get(1)?,
            });
        }
        Ok(completions)
    }
}
