//! Recompute request queue and per-owner write serialization.
//!
//! # Responsibility
//! - Collect recompute requests produced by task/exception mutations.
//! - Coalesce requests for the same `(owner, scope)` into one execution.
//! - Serialize recompute execution per owner across threads and connections
//!   that share one coordinator.
//!
//! # Invariants
//! - At most one pending request exists per `(owner, scope)`; a newer
//!   request takes over the key and its range grows to cover both.
//! - Locks are recovered after a poisoning panic; the guarded state is `()`
//!   and the cache itself is protected by SQLite transactions.

use crate::model::cache::RecomputeScope;
use crate::model::task::OwnerId;
use crate::schedule::calendar::DateRange;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A queued recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecomputeRequest {
    pub owner_id: OwnerId,
    pub scope: RecomputeScope,
    pub range: DateRange,
    /// Monotonic id of the latest enqueue that touched this request.
    pub sequence: u64,
}

type PendingKey = (OwnerId, RecomputeScope);

#[derive(Debug, Default)]
pub struct RecomputeCoordinator {
    owner_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
    pending: Mutex<BTreeMap<PendingKey, RecomputeRequest>>,
    sequence: AtomicU64,
}

impl RecomputeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a recompute, merging it into a pending one for the same key.
    pub fn enqueue(
        &self,
        owner_id: OwnerId,
        scope: RecomputeScope,
        range: DateRange,
    ) -> RecomputeRequest {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let request = pending
            .entry((owner_id, scope))
            .and_modify(|existing| {
                existing.range = existing.range.span(&range);
                existing.sequence = sequence;
            })
            .or_insert(RecomputeRequest {
                owner_id,
                scope,
                range,
                sequence,
            });
        *request
    }

    /// Puts failed or unexecuted requests back, merging with anything queued
    /// in the meantime.
    pub fn requeue(&self, requests: impl IntoIterator<Item = RecomputeRequest>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for request in requests {
            pending
                .entry((request.owner_id, request.scope))
                .and_modify(|existing| {
                    existing.range = existing.range.span(&request.range);
                    existing.sequence = existing.sequence.max(request.sequence);
                })
                .or_insert(request);
        }
    }

    /// Removes and returns every pending request of `owner_id` in enqueue
    /// order. Task requests fully covered by a pending full-owner request
    /// are dropped, since that request rebuilds them anyway.
    pub fn take_pending(&self, owner_id: OwnerId) -> Vec<RecomputeRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<PendingKey> = pending
            .keys()
            .filter(|(owner, _)| *owner == owner_id)
            .copied()
            .collect();
        let mut requests: Vec<RecomputeRequest> = keys
            .iter()
            .filter_map(|key| pending.remove(key))
            .collect();
        drop(pending);

        let full_range = requests
            .iter()
            .find(|request| request.scope == RecomputeScope::All)
            .map(|request| request.range);
        if let Some(full_range) = full_range {
            requests.retain(|request| {
                request.scope == RecomputeScope::All || !full_range.covers(&request.range)
            });
        }
        requests.sort_by_key(|request| request.sequence);
        requests
    }

    pub fn pending_count(&self, owner_id: OwnerId) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(owner, _)| *owner == owner_id)
            .count()
    }

    /// Owners with at least one pending request.
    pub fn pending_owners(&self) -> Vec<OwnerId> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut owners: Vec<OwnerId> = pending.keys().map(|(owner, _)| *owner).collect();
        owners.dedup();
        owners
    }

    /// Runs `f` while holding the exclusive lock for `owner_id`.
    pub fn with_owner_lock<T>(&self, owner_id: OwnerId, f: impl FnOnce() -> T) -> T {
        let owner_lock = {
            let mut locks = self.owner_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(owner_id).or_default())
        };
        let _guard = owner_lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
