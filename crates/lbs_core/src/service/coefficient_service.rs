//! Coefficient use cases over a [`CoefficientRepository`].
//!
//! Coefficient changes only affect load calculation, never the cache, so
//! nothing here triggers a recompute.

use crate::model::coefficients::{CoefficientPatch, CoefficientSet};
use crate::model::task::OwnerId;
use crate::repo::coefficient_repo::CoefficientRepository;
use crate::repo::RepoResult;
use log::info;

pub struct CoefficientService<R: CoefficientRepository> {
    repo: R,
}

impl<R: CoefficientRepository> CoefficientService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Active set for `owner_id`, or defaults (version 0).
    pub fn current(&self, owner_id: OwnerId) -> RepoResult<CoefficientSet> {
        self.repo.current(owner_id)
    }

    /// Applies `patch` on top of the active set and stores a new version.
    pub fn update(&self, owner_id: OwnerId, patch: &CoefficientPatch) -> RepoResult<CoefficientSet> {
        let current = self.repo.current(owner_id)?;
        let next = patch.apply_to(current.coefficients);
        let stored = self.repo.insert_version(owner_id, &next)?;
        info!(
            "event=coefficients_update module=coefficients status=ok owner_id={} version={} alpha={} beta={} cap={} switch_cost={}",
            owner_id,
            stored.version,
            next.alpha,
            next.beta,
            next.cap,
            next.switch_cost
        );
        Ok(stored)
    }

    pub fn history(&self, owner_id: OwnerId) -> RepoResult<Vec<CoefficientSet>> {
        self.repo.history(owner_id)
    }
}
