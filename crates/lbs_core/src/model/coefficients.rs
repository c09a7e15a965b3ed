//! Versioned per-owner load coefficients.
//!
//! # Invariants
//! - Exactly one active set per owner: the highest stored version.
//! - A set is immutable once stored; updates insert a new version.
//! - Owners without a stored set use [`Coefficients::default`].

use crate::model::task::OwnerId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ALPHA: f64 = 0.1;
pub const DEFAULT_BETA: f64 = 1.2;
pub const DEFAULT_CAP: f64 = 8.0;
pub const DEFAULT_SWITCH_COST: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoefficientValidationError {
    #[error("coefficient `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("coefficient `{name}` must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("daily capacity cap must be positive, got {0}")]
    NonPositiveCap(f64),
}

/// Tunable parameters of the load formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// Count-penalty coefficient.
    pub alpha: f64,
    /// Count-penalty exponent.
    pub beta: f64,
    /// Daily capacity ceiling.
    pub cap: f64,
    /// Penalty per additional distinct context.
    pub switch_cost: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            cap: DEFAULT_CAP,
            switch_cost: DEFAULT_SWITCH_COST,
        }
    }
}

impl Coefficients {
    pub fn validate(&self) -> Result<(), CoefficientValidationError> {
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("cap", self.cap),
            ("switch_cost", self.switch_cost),
        ] {
            if !value.is_finite() {
                return Err(CoefficientValidationError::NonFinite { name, value });
            }
            if value < 0.0 {
                return Err(CoefficientValidationError::Negative { name, value });
            }
        }
        if self.cap <= 0.0 {
            return Err(CoefficientValidationError::NonPositiveCap(self.cap));
        }
        Ok(())
    }
}

/// Partial coefficient update; unset fields keep the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoefficientPatch {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub cap: Option<f64>,
    pub switch_cost: Option<f64>,
}

impl CoefficientPatch {
    pub fn apply_to(&self, current: Coefficients) -> Coefficients {
        Coefficients {
            alpha: self.alpha.unwrap_or(current.alpha),
            beta: self.beta.unwrap_or(current.beta),
            cap: self.cap.unwrap_or(current.cap),
            switch_cost: self.switch_cost.unwrap_or(current.switch_cost),
        }
    }
}

/// One stored version of an owner's coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSet {
    pub owner_id: OwnerId,
    /// Monotonic per owner, starting at 1. Version 0 marks built-in defaults.
    pub version: u32,
    pub coefficients: Coefficients,
    /// Epoch milliseconds of the write that produced this version.
    pub updated_at: i64,
}

impl CoefficientSet {
    /// Built-in defaults for owners that never stored a set.
    pub fn defaults_for(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            version: 0,
            coefficients: Coefficients::default(),
            updated_at: 0,
        }
    }

    pub fn is_default(&self) -> bool {
        self.version == 0
    }
}
