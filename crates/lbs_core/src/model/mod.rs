//! Domain model for the load balancing engine.
//!
//! # Responsibility
//! - Define tasks (rules), exceptions, cache rows and coefficient sets.
//! - Keep validation next to the data it protects.
//!
//! # Invariants
//! - Every entity is namespaced by an `OwnerId`; nothing crosses owners.
//! - Tasks are deactivated, never hard-deleted.

pub mod cache;
pub mod coefficients;
pub mod exception;
pub mod task;
