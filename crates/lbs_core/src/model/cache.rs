//! Daily cache rows (materialized read model).
//!
//! # Invariants
//! - Rows are produced only by the cache materializer.
//! - A row exists for `(task, date)` iff the rule matched and no suppression
//!   applied, or a forced inclusion applied.
//! - Rows carry no timestamps, so recomputing unchanged inputs yields equal rows.

use crate::model::task::{OwnerId, TaskId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of one materialized occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Planned,
    Completed,
    /// Never counted by the load calculator.
    Suppressed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Suppressed => "suppressed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planned" => Some(Self::Planned),
            "completed" => Some(Self::Completed),
            "suppressed" => Some(Self::Suppressed),
            _ => None,
        }
    }
}

/// Which precedence step produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// The rule matched and no exception changed the load.
    Rule,
    /// The rule matched and an override replaced the load.
    Override,
    /// A forced inclusion produced the row.
    Forced,
}

impl EntryOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Override => "override",
            Self::Forced => "forced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rule" => Some(Self::Rule),
            "override" => Some(Self::Override),
            "forced" => Some(Self::Forced),
            _ => None,
        }
    }
}

/// Which tasks a recompute covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "task_id", rename_all = "snake_case")]
pub enum RecomputeScope {
    /// Every task of the owner, active or not.
    All,
    /// One task; other tasks' rows are left untouched.
    Task(TaskId),
}

/// One materialized occurrence of a task on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCacheEntry {
    pub owner_id: OwnerId,
    pub target_date: NaiveDate,
    /// Source task id as text; unique per `(owner, date)`.
    pub entry_key: String,
    /// `None` for ad-hoc rows forced onto a day the rule did not produce.
    pub task_id: Option<TaskId>,
    pub task_name: String,
    pub context: String,
    pub load: f64,
    pub status: EntryStatus,
    pub origin: EntryOrigin,
}

impl DailyCacheEntry {
    /// Returns whether this row contributes to the day's load.
    pub fn counts_toward_load(&self) -> bool {
        self.status != EntryStatus::Suppressed
    }
}
