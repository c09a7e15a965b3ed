//! Versioned coefficient sets.
//!
//! # Invariants
//! - Versions per owner start at 1 and grow by one; rows are never updated.
//! - The highest version is the active set. Owners without rows use
//!   [`CoefficientSet::defaults_for`] (version 0).

use crate::model::coefficients::{CoefficientSet, Coefficients};
use crate::model::task::OwnerId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const COEFFICIENT_SELECT_SQL: &str = "SELECT
    owner_id,
    version,
    alpha,
    beta,
    cap,
    switch_cost,
    updated_at
FROM coefficient_sets";

pub trait CoefficientRepository {
    /// Active set, falling back to defaults.
    fn current(&self, owner_id: OwnerId) -> RepoResult<CoefficientSet>;
    /// Appends a new version and returns it.
    fn insert_version(
        &self,
        owner_id: OwnerId,
        coefficients: &Coefficients,
    ) -> RepoResult<CoefficientSet>;
    /// All stored versions, newest first.
    fn history(&self, owner_id: OwnerId) -> RepoResult<Vec<CoefficientSet>>;
}

pub struct SqliteCoefficientRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCoefficientRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CoefficientRepository for SqliteCoefficientRepository<'_> {
    fn current(&self, owner_id: OwnerId) -> RepoResult<CoefficientSet> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{COEFFICIENT_SELECT_SQL}
                     WHERE owner_id = ?1
                     ORDER BY version DESC
                     LIMIT 1;"
                ),
                [owner_id.to_string()],
                |row| Ok(parse_coefficient_row(row)),
            )
            .optional()?;

        match row {
            Some(parsed) => parsed,
            None => Ok(CoefficientSet::defaults_for(owner_id)),
        }
    }

    fn insert_version(
        &self,
        owner_id: OwnerId,
        coefficients: &Coefficients,
    ) -> RepoResult<CoefficientSet> {
        coefficients.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let next_version: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1
             FROM coefficient_sets
             WHERE owner_id = ?1;",
            [owner_id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO coefficient_sets (
                owner_id, version, alpha, beta, cap, switch_cost, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, (strftime('%s', 'now') * 1000));",
            params![
                owner_id.to_string(),
                next_version,
                coefficients.alpha,
                coefficients.beta,
                coefficients.cap,
                coefficients.switch_cost,
            ],
        )?;
        let stored = tx.query_row(
            &format!(
                "{COEFFICIENT_SELECT_SQL}
                 WHERE owner_id = ?1
                   AND version = ?2;"
            ),
            params![owner_id.to_string(), next_version],
            |row| Ok(parse_coefficient_row(row)),
        )??;
        tx.commit()?;
        Ok(stored)
    }

    fn history(&self, owner_id: OwnerId) -> RepoResult<Vec<CoefficientSet>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COEFFICIENT_SELECT_SQL}
             WHERE owner_id = ?1
             ORDER BY version DESC;"
        ))?;
        let mut rows = stmt.query([owner_id.to_string()])?;
        let mut sets = Vec::new();
        while let Some(row) = rows.next()? {
            sets.push(parse_coefficient_row(row)?);
        }
        Ok(sets)
    }
}

fn parse_coefficient_row(row: &Row<'_>) -> RepoResult<CoefficientSet> {
    let owner_text: String = row.get("owner_id")?;
    let set = CoefficientSet {
        owner_id: parse_uuid(&owner_text, "coefficient_sets.owner_id")?,
        version: row.get("version")?,
        coefficients: Coefficients {
            alpha: row.get("alpha")?,
            beta: row.get("beta")?,
            cap: row.get("cap")?,
            switch_cost: row.get("switch_cost")?,
        },
        updated_at: row.get("updated_at")?,
    };
    set.coefficients.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "coefficient set v{} for owner {}: {err}",
            set.version, set.owner_id
        ))
    })?;
    Ok(set)
}
