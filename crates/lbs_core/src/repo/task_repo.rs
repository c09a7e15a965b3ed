//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/update/read APIs over the `tasks` relation.
//! - Map the closed [`RecurrenceRule`] enum onto the flat rule columns.
//!
//! # Invariants
//! - Write paths call `Task::validate()` before SQL mutations.
//! - Rows whose rule columns do not form a valid rule are reported as
//!   `InvalidData`, never silently skipped.
//! - There is no delete API; deactivation is an update.

use crate::model::task::{OwnerId, RecurrenceRule, RuleKind, Task, TaskId, WeekdaySet};
use crate::repo::{bool_to_int, parse_flag, parse_uuid, RepoError, RepoResult};
use crate::schedule::calendar::weekday_to_mon1;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const TASK_SELECT_SQL: &str = "SELECT
    task_id,
    owner_id,
    task_name,
    context,
    base_load,
    active,
    rule_type,
    due_date,
    mon, tue, wed, thu, fri, sat, sun,
    anchor_date,
    interval_days,
    month_day,
    nth_in_month,
    weekday_mon1,
    start_date,
    end_date,
    notes,
    external_sync_id
FROM tasks";

const WEEKDAY_COLUMNS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Query options for listing one owner's tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListQuery {
    pub owner_id: OwnerId,
    pub include_inactive: bool,
    /// Exact context filter after trimming.
    pub context: Option<String>,
}

impl TaskListQuery {
    pub fn active(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            include_inactive: false,
            context: None,
        }
    }

    pub fn all(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            include_inactive: true,
            context: None,
        }
    }
}

/// Repository interface for task persistence.
pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId>;
    /// Full replacement of an existing task owned by `task.owner_id`.
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, owner_id: OwnerId, task_id: TaskId) -> RepoResult<Option<Task>>;
    /// Lists tasks ordered by `task_id` for deterministic expansion.
    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>>;
    /// Distinct owners that have at least one task.
    fn list_owner_ids(&self) -> RepoResult<Vec<OwnerId>>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;
        let columns = RuleColumns::from_rule(&task.rule);

        self.conn.execute(
            "INSERT INTO tasks (
                task_id, owner_id, task_name, context, base_load, active,
                rule_type, due_date,
                mon, tue, wed, thu, fri, sat, sun,
                anchor_date, interval_days, month_day, nth_in_month, weekday_mon1,
                start_date, end_date, notes, external_sync_id
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8,
                ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20,
                ?21, ?22, ?23, ?24
            );",
            params![
                task.id.to_string(),
                task.owner_id.to_string(),
                task.name.trim(),
                task.context.trim(),
                task.base_load,
                bool_to_int(task.active),
                columns.rule_type,
                columns.due_date,
                bool_to_int(columns.flags[0]),
                bool_to_int(columns.flags[1]),
                bool_to_int(columns.flags[2]),
                bool_to_int(columns.flags[3]),
                bool_to_int(columns.flags[4]),
                bool_to_int(columns.flags[5]),
                bool_to_int(columns.flags[6]),
                columns.anchor_date,
                columns.interval_days,
                columns.month_day,
                columns.nth_in_month,
                columns.weekday_mon1,
                task.start_date,
                task.end_date,
                task.notes.as_deref(),
                task.external_sync_id.as_deref(),
            ],
        )?;

        Ok(task.id)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;
        let columns = RuleColumns::from_rule(&task.rule);

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                task_name = ?3,
                context = ?4,
                base_load = ?5,
                active = ?6,
                rule_type = ?7,
                due_date = ?8,
                mon = ?9, tue = ?10, wed = ?11, thu = ?12, fri = ?13, sat = ?14, sun = ?15,
                anchor_date = ?16,
                interval_days = ?17,
                month_day = ?18,
                nth_in_month = ?19,
                weekday_mon1 = ?20,
                start_date = ?21,
                end_date = ?22,
                notes = ?23,
                external_sync_id = ?24,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE task_id = ?1
               AND owner_id = ?2;",
            params![
                task.id.to_string(),
                task.owner_id.to_string(),
                task.name.trim(),
                task.context.trim(),
                task.base_load,
                bool_to_int(task.active),
                columns.rule_type,
                columns.due_date,
                bool_to_int(columns.flags[0]),
                bool_to_int(columns.flags[1]),
                bool_to_int(columns.flags[2]),
                bool_to_int(columns.flags[3]),
                bool_to_int(columns.flags[4]),
                bool_to_int(columns.flags[5]),
                bool_to_int(columns.flags[6]),
                columns.anchor_date,
                columns.interval_days,
                columns.month_day,
                columns.nth_in_month,
                columns.weekday_mon1,
                task.start_date,
                task.end_date,
                task.notes.as_deref(),
                task.external_sync_id.as_deref(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "task",
                id: task.id,
            });
        }
        Ok(())
    }

    fn get_task(&self, owner_id: OwnerId, task_id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE task_id = ?1
               AND owner_id = ?2;"
        ))?;

        let mut rows = stmt.query(params![task_id.to_string(), owner_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE owner_id = ?");
        let mut bind_values = vec![Value::Text(query.owner_id.to_string())];

        if !query.include_inactive {
            sql.push_str(" AND active = 1");
        }
        if let Some(context) = query.context.as_ref() {
            sql.push_str(" AND context = ?");
            bind_values.push(Value::Text(context.trim().to_string()));
        }
        sql.push_str(" ORDER BY task_id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn list_owner_ids(&self) -> RepoResult<Vec<OwnerId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT owner_id FROM tasks ORDER BY owner_id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut owners = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            owners.push(parse_uuid(&value, "tasks.owner_id")?);
        }
        Ok(owners)
    }
}

/// Flat column projection of a [`RecurrenceRule`].
struct RuleColumns {
    rule_type: &'static str,
    due_date: Option<NaiveDate>,
    flags: [bool; 7],
    anchor_date: Option<NaiveDate>,
    interval_days: Option<i64>,
    month_day: Option<i64>,
    nth_in_month: Option<i64>,
    weekday_mon1: Option<i64>,
}

impl RuleColumns {
    fn from_rule(rule: &RecurrenceRule) -> Self {
        let mut columns = Self {
            rule_type: rule.kind().as_str(),
            due_date: None,
            flags: [false; 7],
            anchor_date: None,
            interval_days: None,
            month_day: None,
            nth_in_month: None,
            weekday_mon1: None,
        };
        match rule {
            RecurrenceRule::Once { due_date } => columns.due_date = Some(*due_date),
            RecurrenceRule::Weekly { days } => columns.flags = days.flags(),
            RecurrenceRule::EveryNDays {
                anchor_date,
                interval_days,
            } => {
                columns.anchor_date = Some(*anchor_date);
                columns.interval_days = Some(i64::from(*interval_days));
            }
            RecurrenceRule::MonthlyDay { month_day } => {
                columns.month_day = Some(i64::from(*month_day));
            }
            RecurrenceRule::MonthlyNthWeekday { nth, weekday } => {
                columns.nth_in_month = Some(nth.index());
                columns.weekday_mon1 = Some(weekday_to_mon1(*weekday));
            }
        }
        columns
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("task_id")?;
    let owner_text: String = row.get("owner_id")?;

    let task = Task {
        id: parse_uuid(&id_text, "tasks.task_id")?,
        owner_id: parse_uuid(&owner_text, "tasks.owner_id")?,
        name: row.get("task_name")?,
        context: row.get("context")?,
        base_load: row.get("base_load")?,
        active: parse_flag(row.get("active")?, "tasks.active")?,
        rule: parse_rule(row)?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        notes: row.get("notes")?,
        external_sync_id: row.get("external_sync_id")?,
    };
    task.validate()
        .map_err(|err| RepoError::InvalidData(format!("task {id_text}: {err}")))?;
    Ok(task)
}

fn parse_rule(row: &Row<'_>) -> RepoResult<RecurrenceRule> {
    let rule_text: String = row.get("rule_type")?;
    let kind = RuleKind::parse(&rule_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid rule type `{rule_text}` in tasks.rule_type"))
    })?;
    let missing = |column: &str| {
        RepoError::InvalidData(format!(
            "rule `{rule_text}` requires non-null tasks.{column}"
        ))
    };

    let rule = match kind {
        RuleKind::Once => RecurrenceRule::Once {
            due_date: row
                .get::<_, Option<NaiveDate>>("due_date")?
                .ok_or_else(|| missing("due_date"))?,
        },
        RuleKind::Weekly => {
            let mut flags = [false; 7];
            for (flag, column) in flags.iter_mut().zip(WEEKDAY_COLUMNS) {
                *flag = parse_flag(row.get(column)?, column)?;
            }
            RecurrenceRule::Weekly {
                days: WeekdaySet::from_flags(flags),
            }
        }
        RuleKind::EveryNDays => {
            let anchor_date = row
                .get::<_, Option<NaiveDate>>("anchor_date")?
                .ok_or_else(|| missing("anchor_date"))?;
            let interval_days = row
                .get::<_, Option<i64>>("interval_days")?
                .ok_or_else(|| missing("interval_days"))?;
            RecurrenceRule::every_n_days(anchor_date, interval_days)?
        }
        RuleKind::MonthlyDay => {
            let month_day = row
                .get::<_, Option<i64>>("month_day")?
                .ok_or_else(|| missing("month_day"))?;
            RecurrenceRule::monthly_day(month_day)?
        }
        RuleKind::MonthlyNthWeekday => {
            let nth = row
                .get::<_, Option<i64>>("nth_in_month")?
                .ok_or_else(|| missing("nth_in_month"))?;
            let weekday = row
                .get::<_, Option<i64>>("weekday_mon1")?
                .ok_or_else(|| missing("weekday_mon1"))?;
            RecurrenceRule::monthly_nth_weekday(nth, weekday)?
        }
    };
    Ok(rule)
}
