//! Exception resolver: final disposition of one `(task, date)` occurrence.
//!
//! Precedence, first hit wins:
//! 1. SUPPRESS -> absent, whatever the rule says.
//! 2. OVERRIDE_LOAD on a matched day -> present with the override load.
//! 3. FORCE_INCLUDE -> present with the base load, whatever the rule says.
//! 4. rule matched -> present with the base load.
//! 5. absent.

use crate::model::cache::EntryOrigin;
use crate::model::exception::ExceptionKind;
use crate::model::task::Task;
use serde::Serialize;

/// Outcome for one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Absent,
    Present { load: f64, origin: EntryOrigin },
}

impl Disposition {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    pub fn load(&self) -> Option<f64> {
        match self {
            Self::Present { load, .. } => Some(*load),
            Self::Absent => None,
        }
    }
}

/// Resolves the disposition of `task` on a day from every exception filed
/// for that day and the rule matcher's verdict.
///
/// Storage keeps one exception per `(task, date)`, but the precedence holds
/// for any combination passed in.
pub fn resolve(task: &Task, exceptions: &[ExceptionKind], rule_matched: bool) -> Disposition {
    let mut override_load = None;
    let mut forced = false;
    for kind in exceptions {
        match kind {
            ExceptionKind::Suppress => return Disposition::Absent,
            ExceptionKind::OverrideLoad { load } => {
                override_load.get_or_insert(*load);
            }
            ExceptionKind::ForceInclude => forced = true,
        }
    }

    match (override_load, forced, rule_matched) {
        (Some(load), _, true) => Disposition::Present {
            load,
            origin: EntryOrigin::Override,
        },
        (_, true, _) => Disposition::Present {
            load: task.base_load,
            origin: EntryOrigin::Forced,
        },
        (_, false, true) => Disposition::Present {
            load: task.base_load,
            origin: EntryOrigin::Rule,
        },
        (_, false, false) => Disposition::Absent,
    }
}
