//! Exception repository contracts and SQLite implementation.
//!
//! # Invariants
//! - At most one exception exists per `(task_id, target_date)`; a second
//!   write for the same key replaces kind, load and reason in place and keeps
//!   the first exception id.
//! - The referenced task must belong to the same owner (enforced by callers).

use crate::model::exception::{ExceptionId, ExceptionKind, TaskException};
use crate::model::task::{OwnerId, TaskId};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use crate::schedule::calendar::DateRange;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const EXCEPTION_SELECT_SQL: &str = "SELECT
    exception_id,
    owner_id,
    task_id,
    target_date,
    exception_type,
    override_load,
    reason
FROM task_exceptions";

pub trait ExceptionRepository {
    /// Inserts or replaces the exception for `(task_id, target_date)` and
    /// returns the stored row.
    fn upsert_exception(&self, exception: &TaskException) -> RepoResult<TaskException>;
    fn get_exception(
        &self,
        owner_id: OwnerId,
        exception_id: ExceptionId,
    ) -> RepoResult<Option<TaskException>>;
    /// Deletes and returns the removed row, `None` when it did not exist.
    fn delete_exception(
        &self,
        owner_id: OwnerId,
        exception_id: ExceptionId,
    ) -> RepoResult<Option<TaskException>>;
    /// Ordered by `(target_date, task_id)`.
    fn list_exceptions(
        &self,
        owner_id: OwnerId,
        task_id: Option<TaskId>,
        range: Option<DateRange>,
    ) -> RepoResult<Vec<TaskException>>;
}

pub struct SqliteExceptionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteExceptionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn find_by_key(
        &self,
        task_id: TaskId,
        target_date: NaiveDate,
    ) -> RepoResult<Option<TaskException>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXCEPTION_SELECT_SQL}
             WHERE task_id = ?1
               AND target_date = ?2;"
        ))?;
        let row = stmt
            .query_row(params![task_id.to_string(), target_date], |row| {
                Ok(parse_exception_row(row))
            })
            .optional()?;
        row.transpose()
    }
}

impl ExceptionRepository for SqliteExceptionRepository<'_> {
    fn upsert_exception(&self, exception: &TaskException) -> RepoResult<TaskException> {
        exception.validate()?;

        self.conn.execute(
            "INSERT INTO task_exceptions (
                exception_id, owner_id, task_id, target_date,
                exception_type, override_load, reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (task_id, target_date) DO UPDATE SET
                exception_type = excluded.exception_type,
                override_load = excluded.override_load,
                reason = excluded.reason,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                exception.id.to_string(),
                exception.owner_id.to_string(),
                exception.task_id.to_string(),
                exception.target_date,
                exception.kind.as_str(),
                exception.kind.override_load(),
                exception.reason.as_deref(),
            ],
        )?;

        self.find_by_key(exception.task_id, exception.target_date)?
            .ok_or(RepoError::NotFound {
                entity: "exception",
                id: exception.id,
            })
    }

    fn get_exception(
        &self,
        owner_id: OwnerId,
        exception_id: ExceptionId,
    ) -> RepoResult<Option<TaskException>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EXCEPTION_SELECT_SQL}
             WHERE exception_id = ?1
               AND owner_id = ?2;"
        ))?;
        let row = stmt
            .query_row(
                params![exception_id.to_string(), owner_id.to_string()],
                |row| Ok(parse_exception_row(row)),
            )
            .optional()?;
        row.transpose()
    }

    fn delete_exception(
        &self,
        owner_id: OwnerId,
        exception_id: ExceptionId,
    ) -> RepoResult<Option<TaskException>> {
        let Some(existing) = self.get_exception(owner_id, exception_id)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM task_exceptions
             WHERE exception_id = ?1
               AND owner_id = ?2;",
            params![exception_id.to_string(), owner_id.to_string()],
        )?;
        Ok(Some(existing))
    }

    fn list_exceptions(
        &self,
        owner_id: OwnerId,
        task_id: Option<TaskId>,
        range: Option<DateRange>,
    ) -> RepoResult<Vec<TaskException>> {
        let mut sql = format!("{EXCEPTION_SELECT_SQL} WHERE owner_id = ?");
        let mut bind_values = vec![Value::Text(owner_id.to_string())];

        if let Some(task_id) = task_id {
            sql.push_str(" AND task_id = ?");
            bind_values.push(Value::Text(task_id.to_string()));
        }
        if let Some(range) = range {
            sql.push_str(" AND target_date >= ? AND target_date <= ?");
            bind_values.push(Value::Text(range.start.to_string()));
            bind_values.push(Value::Text(range.end.to_string()));
        }
        sql.push_str(" ORDER BY target_date ASC, task_id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut exceptions = Vec::new();
        while let Some(row) = rows.next()? {
            exceptions.push(parse_exception_row(row)?);
        }
        Ok(exceptions)
    }
}

fn parse_exception_row(row: &Row<'_>) -> RepoResult<TaskException> {
    let id_text: String = row.get("exception_id")?;
    let owner_text: String = row.get("owner_id")?;
    let task_text: String = row.get("task_id")?;
    let kind_text: String = row.get("exception_type")?;
    let override_load: Option<f64> = row.get("override_load")?;

    let kind = ExceptionKind::from_parts(&kind_text, override_load).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid exception `{kind_text}` with override_load {override_load:?} in task_exceptions"
        ))
    })?;

    Ok(TaskException {
        id: parse_uuid(&id_text, "task_exceptions.exception_id")?,
        owner_id: parse_uuid(&owner_text, "task_exceptions.owner_id")?,
        task_id: parse_uuid(&task_text, "task_exceptions.task_id")?,
        target_date: row.get("target_date")?,
        kind,
        reason: row.get("reason")?,
    })
}
