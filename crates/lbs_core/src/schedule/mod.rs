//! Pure scheduling logic: calendar arithmetic, rule matching and exception
//! resolution.
//!
//! # Invariants
//! - No I/O, no clock reads. Output depends only on the arguments.
//! - "No such date" is a no-match, never an error.

pub mod calendar;
pub mod matcher;
pub mod resolver;
