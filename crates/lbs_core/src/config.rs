//! Engine configuration.
//!
//! # Responsibility
//! - Hold the rolling horizon and recompute flushing policy.
//! - Resolve settings from `LBS_*` environment variables.
//!
//! # Invariants
//! - Malformed environment values never fail startup; they fall back to
//!   defaults and emit a `config_fallback` warning.
//! - Each horizon side is at most [`MAX_HORIZON_DAYS`]; larger values are
//!   clamped.

use crate::schedule::calendar::DateRange;
use chrono::{Days, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_HORIZON_PAST_DAYS: u32 = 30;
pub const DEFAULT_HORIZON_FUTURE_DAYS: u32 = 365;
/// Upper bound for either side of the horizon (about ten years).
pub const MAX_HORIZON_DAYS: u32 = 3650;

pub const ENV_HORIZON_PAST_DAYS: &str = "LBS_HORIZON_PAST_DAYS";
pub const ENV_HORIZON_FUTURE_DAYS: &str = "LBS_HORIZON_FUTURE_DAYS";
pub const ENV_AUTO_FLUSH: &str = "LBS_AUTO_FLUSH";
pub const ENV_DB_PATH: &str = "LBS_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "LBS_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "LBS_LOG_DIR";

const DEFAULT_DB_FILE_NAME: &str = "lbs_engine.sqlite3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Days before `as_of` kept materialized.
    pub horizon_past_days: u32,
    /// Days after `as_of` kept materialized.
    pub horizon_future_days: u32,
    /// Drain queued recomputes right after each mutation.
    pub auto_flush: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            horizon_past_days: DEFAULT_HORIZON_PAST_DAYS,
            horizon_future_days: DEFAULT_HORIZON_FUTURE_DAYS,
            auto_flush: true,
        }
    }
}

impl EngineSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults per field.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            horizon_past_days: parse_horizon_days(
                &lookup,
                ENV_HORIZON_PAST_DAYS,
                defaults.horizon_past_days,
            ),
            horizon_future_days: parse_horizon_days(
                &lookup,
                ENV_HORIZON_FUTURE_DAYS,
                defaults.horizon_future_days,
            ),
            auto_flush: parse_or_default(&lookup, ENV_AUTO_FLUSH, defaults.auto_flush, parse_bool),
        }
    }

    /// Inclusive rolling horizon anchored at `as_of`.
    ///
    /// Each side is capped at [`MAX_HORIZON_DAYS`] and saturates at the
    /// chrono date limits instead of failing.
    pub fn horizon(&self, as_of: NaiveDate) -> DateRange {
        let past = self.horizon_past_days.min(MAX_HORIZON_DAYS);
        let future = self.horizon_future_days.min(MAX_HORIZON_DAYS);
        let start = as_of
            .checked_sub_days(Days::new(u64::from(past)))
            .unwrap_or(NaiveDate::MIN);
        let end = as_of
            .checked_add_days(Days::new(u64::from(future)))
            .unwrap_or(NaiveDate::MAX);
        DateRange { start, end }
    }
}

/// Database path from `LBS_DB_PATH`, or a file in the temp directory.
pub fn resolve_db_path() -> PathBuf {
    if let Ok(raw) = std::env::var(ENV_DB_PATH) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
}

fn parse_or_default<T: Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match parse(raw.trim()) {
        Some(value) => value,
        None => {
            warn!(
                "event=config_fallback module=config status=error key={} value={:?} default={}",
                key, raw, default
            );
            default
        }
    }
}

fn parse_horizon_days(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> u32 {
    let days = parse_or_default(lookup, key, default, |raw| raw.parse::<u32>().ok());
    if days > MAX_HORIZON_DAYS {
        warn!(
            "event=config_fallback module=config status=error key={} value={} clamped={}",
            key, days, MAX_HORIZON_DAYS
        );
        return MAX_HORIZON_DAYS;
    }
    days
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
