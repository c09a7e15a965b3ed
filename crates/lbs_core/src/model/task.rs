//! Task domain model (rule definition, write model).
//!
//! # Responsibility
//! - Define the recurring task record the materializer expands.
//! - Make "required rule parameters are present" a structural property of
//!   [`RecurrenceRule`] instead of a runtime null check.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - Tasks are deactivated, never hard-deleted.
//! - `validate()` must pass before a task reaches storage; expansion code
//!   assumes valid input and never reports validation errors.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Tenant scope under which every task, exception and cache row lives.
pub type OwnerId = Uuid;

/// Stable task identifier.
pub type TaskId = Uuid;

/// Lowest accepted load score for tasks and overrides.
pub const MIN_LOAD_SCORE: f64 = 0.0;
/// Highest accepted load score for tasks and overrides.
pub const MAX_LOAD_SCORE: f64 = 10.0;

/// Validation failures detected at the CRUD boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskValidationError {
    #[error("task name must not be blank")]
    BlankName,
    #[error("base load {0} is outside [0.0, 10.0]")]
    LoadOutOfRange(f64),
    #[error("interval_days must be >= 1, got {0}")]
    InvalidIntervalDays(i64),
    #[error("month_day must be within [1, 31], got {0}")]
    InvalidMonthDay(i64),
    #[error("nth_in_month must be one of 1..5 or -1, got {0}")]
    InvalidNthInMonth(i64),
    #[error("weekday must be within 1..7 (Monday = 1), got {0}")]
    InvalidWeekday(i64),
    #[error("weekly rule needs at least one weekday")]
    EmptyWeekdaySet,
    #[error("validity window start {start} is after end {end}")]
    InvalidValidityWindow { start: NaiveDate, end: NaiveDate },
}

/// Which occurrence of a weekday inside a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NthWeekday {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Last,
}

impl NthWeekday {
    /// Parses the stored numeric form (`1..=5`, `-1` for last).
    pub fn from_index(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            3 => Some(Self::Third),
            4 => Some(Self::Fourth),
            5 => Some(Self::Fifth),
            -1 => Some(Self::Last),
            _ => None,
        }
    }

    /// Stored numeric form.
    pub fn index(self) -> i64 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
            Self::Fourth => 4,
            Self::Fifth => 5,
            Self::Last => -1,
        }
    }
}

/// Seven weekday flags packed into one byte, bit 0 = Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);

    /// Builds a set from flags ordered Monday..Sunday.
    pub fn from_flags(flags: [bool; 7]) -> Self {
        let mut bits = 0u8;
        for (index, flag) in flags.iter().enumerate() {
            if *flag {
                bits |= 1 << index;
            }
        }
        Self(bits)
    }

    /// Returns flags ordered Monday..Sunday.
    pub fn flags(self) -> [bool; 7] {
        let mut flags = [false; 7];
        for (index, flag) in flags.iter_mut().enumerate() {
            *flag = self.0 & (1 << index) != 0;
        }
        flags
    }

    pub fn with(self, weekday: Weekday) -> Self {
        Self(self.0 | bit(weekday))
    }

    pub fn contains(self, weekday: Weekday) -> bool {
        self.0 & bit(weekday) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

fn bit(weekday: Weekday) -> u8 {
    1 << weekday.num_days_from_monday()
}

/// Discriminant of [`RecurrenceRule`], used for storage and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Once,
    Weekly,
    EveryNDays,
    MonthlyDay,
    MonthlyNthWeekday,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "ONCE",
            Self::Weekly => "WEEKLY",
            Self::EveryNDays => "EVERY_N_DAYS",
            Self::MonthlyDay => "MONTHLY_DAY",
            Self::MonthlyNthWeekday => "MONTHLY_NTH_WEEKDAY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONCE" => Some(Self::Once),
            "WEEKLY" => Some(Self::Weekly),
            "EVERY_N_DAYS" => Some(Self::EveryNDays),
            "MONTHLY_DAY" => Some(Self::MonthlyDay),
            "MONTHLY_NTH_WEEKDAY" => Some(Self::MonthlyNthWeekday),
            _ => None,
        }
    }
}

/// Recurrence definition. Each variant carries exactly the parameters its
/// kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceRule {
    /// Single occurrence on `due_date`.
    Once { due_date: NaiveDate },
    /// Every week on the flagged weekdays.
    Weekly { days: WeekdaySet },
    /// Every `interval_days` days counted from `anchor_date`.
    EveryNDays {
        anchor_date: NaiveDate,
        interval_days: u32,
    },
    /// The same day number every month; months without that day are skipped.
    MonthlyDay { month_day: u32 },
    /// The n-th (or last) given weekday of every month.
    MonthlyNthWeekday { nth: NthWeekday, weekday: Weekday },
}

impl RecurrenceRule {
    pub fn once(due_date: NaiveDate) -> Self {
        Self::Once { due_date }
    }

    pub fn weekly(days: impl IntoIterator<Item = Weekday>) -> Result<Self, TaskValidationError> {
        let days = days.into_iter().collect::<WeekdaySet>();
        if days.is_empty() {
            return Err(TaskValidationError::EmptyWeekdaySet);
        }
        Ok(Self::Weekly { days })
    }

    pub fn every_n_days(
        anchor_date: NaiveDate,
        interval_days: i64,
    ) -> Result<Self, TaskValidationError> {
        match u32::try_from(interval_days) {
            Ok(interval_days) if interval_days >= 1 => Ok(Self::EveryNDays {
                anchor_date,
                interval_days,
            }),
            _ => Err(TaskValidationError::InvalidIntervalDays(interval_days)),
        }
    }

    pub fn monthly_day(month_day: i64) -> Result<Self, TaskValidationError> {
        match u32::try_from(month_day) {
            Ok(month_day) if (1..=31).contains(&month_day) => Ok(Self::MonthlyDay { month_day }),
            _ => Err(TaskValidationError::InvalidMonthDay(month_day)),
        }
    }

    /// Builds a MONTHLY_NTH_WEEKDAY rule from its stored numeric parameters.
    pub fn monthly_nth_weekday(
        nth_in_month: i64,
        weekday_mon1: i64,
    ) -> Result<Self, TaskValidationError> {
        let nth = NthWeekday::from_index(nth_in_month)
            .ok_or(TaskValidationError::InvalidNthInMonth(nth_in_month))?;
        let weekday = crate::schedule::calendar::weekday_from_mon1(weekday_mon1)
            .ok_or(TaskValidationError::InvalidWeekday(weekday_mon1))?;
        Ok(Self::MonthlyNthWeekday { nth, weekday })
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Once { .. } => RuleKind::Once,
            Self::Weekly { .. } => RuleKind::Weekly,
            Self::EveryNDays { .. } => RuleKind::EveryNDays,
            Self::MonthlyDay { .. } => RuleKind::MonthlyDay,
            Self::MonthlyNthWeekday { .. } => RuleKind::MonthlyNthWeekday,
        }
    }

    /// Re-checks numeric parameters, since variant fields are public.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        match self {
            Self::Once { .. } | Self::MonthlyNthWeekday { .. } => Ok(()),
            Self::Weekly { days } if days.is_empty() => Err(TaskValidationError::EmptyWeekdaySet),
            Self::Weekly { .. } => Ok(()),
            Self::EveryNDays { interval_days, .. } if *interval_days == 0 => {
                Err(TaskValidationError::InvalidIntervalDays(0))
            }
            Self::EveryNDays { .. } => Ok(()),
            Self::MonthlyDay { month_day } if !(1..=31).contains(month_day) => Err(
                TaskValidationError::InvalidMonthDay(i64::from(*month_day)),
            ),
            Self::MonthlyDay { .. } => Ok(()),
        }
    }
}

/// Canonical recurring task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: OwnerId,
    /// Display name, snapshotted into cache rows.
    pub name: String,
    /// Free-text project label; drives the context-switch penalty.
    pub context: String,
    /// Load score in `[0.0, 10.0]`.
    pub base_load: f64,
    pub active: bool,
    pub rule: RecurrenceRule,
    /// Inclusive lower bound of the validity window. `None` = unbounded.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound of the validity window. `None` = unbounded.
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Correlation id for external task/calendar sync.
    pub external_sync_id: Option<String>,
}

impl Task {
    /// Creates an active task with a generated id and an unbounded window.
    pub fn new(
        owner_id: OwnerId,
        name: impl Into<String>,
        base_load: f64,
        rule: RecurrenceRule,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), owner_id, name, base_load, rule)
    }

    /// Creates a task with a caller-provided id (import/sync paths).
    pub fn with_id(
        id: TaskId,
        owner_id: OwnerId,
        name: impl Into<String>,
        base_load: f64,
        rule: RecurrenceRule,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            context: String::new(),
            base_load,
            active: true,
            rule,
            start_date: None,
            end_date: None,
            notes: None,
            external_sync_id: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Validates write-path invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.name.trim().is_empty() {
            return Err(TaskValidationError::BlankName);
        }
        validate_load(self.base_load)?;
        self.rule.validate()?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(TaskValidationError::InvalidValidityWindow { start, end });
            }
        }
        Ok(())
    }

    /// Returns whether `date` lies inside the inclusive validity window.
    pub fn is_within_window(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| start <= date)
            && self.end_date.map_or(true, |end| date <= end)
    }

    /// Marks the task inactive. Cache rows are dropped on the next recompute.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Key of this task's rows in the daily cache.
    pub fn entry_key(&self) -> String {
        self.id.to_string()
    }

    /// Trimmed context label used for distinct-context counting.
    pub fn context_tag(&self) -> &str {
        self.context.trim()
    }
}

/// Partial update for [`Task`]. `None` leaves a field unchanged; the
/// double-`Option` fields can clear a value with `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub context: Option<String>,
    pub base_load: Option<f64>,
    pub active: Option<bool>,
    pub rule: Option<RecurrenceRule>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub notes: Option<Option<String>>,
    pub external_sync_id: Option<Option<String>>,
}

impl TaskPatch {
    /// Returns whether applying this patch can change materialized rows.
    ///
    /// Notes and sync ids are not part of the cache; everything else is,
    /// either through scheduling or through the name/context snapshots.
    pub fn touches_cache(&self) -> bool {
        self.name.is_some()
            || self.context.is_some()
            || self.base_load.is_some()
            || self.active.is_some()
            || self.rule.is_some()
            || self.start_date.is_some()
            || self.end_date.is_some()
    }

    /// Applies this patch to `task` in place. Callers validate afterwards.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(context) = &self.context {
            task.context = context.clone();
        }
        if let Some(base_load) = self.base_load {
            task.base_load = base_load;
        }
        if let Some(active) = self.active {
            task.active = active;
        }
        if let Some(rule) = &self.rule {
            task.rule = rule.clone();
        }
        if let Some(start_date) = self.start_date {
            task.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            task.end_date = end_date;
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(external_sync_id) = &self.external_sync_id {
            task.external_sync_id = external_sync_id.clone();
        }
    }
}

/// Checks that a load score is finite and inside `[0.0, 10.0]`.
pub fn validate_load(value: f64) -> Result<(), TaskValidationError> {
    if value.is_finite() && (MIN_LOAD_SCORE..=MAX_LOAD_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(TaskValidationError::LoadOutOfRange(value))
    }
}
