//! Engine services.
//!
//! # Responsibility
//! - Orchestrate repository calls into engine-level use cases.
//! - Keep callers (CLI, dashboard, CRUD layer) decoupled from storage details.

use crate::model::exception::ExceptionId;
use crate::model::task::TaskId;
use crate::repo::RepoError;
use chrono::NaiveDate;
use thiserror::Error;

pub mod clock;
pub mod coefficient_service;
pub mod engine;
pub mod load;
pub mod materializer;
pub mod recompute_queue;

pub type EngineResult<T> = Result<T, EngineError>;

/// Error returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Repo(#[from] RepoError),
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("task is inactive: {0}")]
    TaskInactive(TaskId),
    #[error("exception not found: {0}")]
    ExceptionNotFound(ExceptionId),
}

impl EngineError {
    /// Storage failures can be retried; the failed recompute left the
    /// previous cache rows in place.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}
