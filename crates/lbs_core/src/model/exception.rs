//! Point-in-time exceptions applied on top of recurrence rules.
//!
//! # Invariants
//! - At most one exception exists per `(task_id, target_date)`; writing a
//!   second one replaces the first.
//! - The override load exists iff the kind is `OverrideLoad` (it lives inside
//!   the variant).

use crate::model::task::{validate_load, OwnerId, TaskId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable exception identifier.
pub type ExceptionId = Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExceptionValidationError {
    #[error("override load {0} is outside [0.0, 10.0]")]
    OverrideLoadOutOfRange(f64),
}

/// What an exception does to its `(task, date)` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionKind {
    /// Absolute veto: no occurrence on that day.
    Suppress,
    /// Replaces the load of an occurrence the rule produced.
    OverrideLoad { load: f64 },
    /// Adds an occurrence regardless of the rule.
    ForceInclude,
}

impl ExceptionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suppress => "SUPPRESS",
            Self::OverrideLoad { .. } => "OVERRIDE_LOAD",
            Self::ForceInclude => "FORCE_INCLUDE",
        }
    }

    /// Rebuilds a kind from its stored `(type, override_load)` columns.
    pub fn from_parts(kind: &str, override_load: Option<f64>) -> Option<Self> {
        match (kind, override_load) {
            ("SUPPRESS", None) => Some(Self::Suppress),
            ("OVERRIDE_LOAD", Some(load)) => Some(Self::OverrideLoad { load }),
            ("FORCE_INCLUDE", None) => Some(Self::ForceInclude),
            _ => None,
        }
    }

    pub fn override_load(self) -> Option<f64> {
        match self {
            Self::OverrideLoad { load } => Some(load),
            Self::Suppress | Self::ForceInclude => None,
        }
    }
}

/// Exception record for one task occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskException {
    pub id: ExceptionId,
    pub owner_id: OwnerId,
    pub task_id: TaskId,
    pub target_date: NaiveDate,
    pub kind: ExceptionKind,
    /// Free-text reason shown to the owner.
    pub reason: Option<String>,
}

impl TaskException {
    pub fn new(
        owner_id: OwnerId,
        task_id: TaskId,
        target_date: NaiveDate,
        kind: ExceptionKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            task_id,
            target_date,
            kind,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn validate(&self) -> Result<(), ExceptionValidationError> {
        if let ExceptionKind::OverrideLoad { load } = self.kind {
            validate_load(load).map_err(|_| ExceptionValidationError::OverrideLoadOutOfRange(load))?;
        }
        Ok(())
    }
}
