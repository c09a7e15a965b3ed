//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per relation.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Every query is scoped by `owner_id`; no repository call crosses owners.
//! - Write paths validate models before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::coefficients::CoefficientValidationError;
use crate::model::exception::ExceptionValidationError;
use crate::model::task::TaskValidationError;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

pub mod cache_repo;
pub mod coefficient_repo;
pub mod completion_repo;
pub mod exception_repo;
pub mod task_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all relations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    TaskValidation(#[from] TaskValidationError),
    #[error("{0}")]
    ExceptionValidation(#[from] ExceptionValidationError),
    #[error("{0}")]
    CoefficientValidation(#[from] CoefficientValidationError),
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("repository requires schema version {expected_version}, got {actual_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("repository requires table `{0}`")]
    MissingRequiredTable(&'static str),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Storage failures are retryable; a recompute can simply be re-run.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Db(err) => err.is_retryable(),
            _ => false,
        }
    }
}

const REQUIRED_TABLES: &[&str] = &[
    "tasks",
    "task_exceptions",
    "daily_cache",
    "coefficient_sets",
    "task_completions",
];

/// Verifies that `conn` was opened through `db::open_db*` and is fully migrated.
pub fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
