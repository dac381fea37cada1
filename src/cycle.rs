//! Cycle metadata and the start/resume/wait decision.
//!
//! A cycle is one bounded analysis pass over the full hierarchy, spanning as
//! many invocations as it takes to complete. The decision over persisted
//! metadata is a pure function so it can be tested without any store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStatus {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
    /// Error rows across the whole cycle, recomputed at each aggregation.
    pub error_count: usize,
}

impl CycleStatus {
    /// A cycle is in progress iff it started and has not completed since.
    pub fn in_progress(&self) -> bool {
        match (self.started_at, self.completed_at) {
            (Some(_), None) => true,
            (Some(started), Some(completed)) => completed < started,
            _ => false,
        }
    }
}

/// What this invocation should do with the persisted cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleAction {
    /// Very first execution: archive old results and stamp a fresh start.
    StartNew,
    /// A cycle is underway; keep its checkpoint marks and continue.
    Resume,
    /// Last cycle finished recently; do nothing this invocation.
    Wait { remaining_days: f64 },
    /// Enough time has passed: clear every checkpoint mark, then start anew.
    ResetAndStart,
}

/// Fractional days between two instants.
pub fn day_difference(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / (24.0 * 3600.0 * 1000.0)
}

pub fn decide(status: &CycleStatus, frequency_days: f64, now: DateTime<Utc>) -> CycleAction {
    let started = match status.started_at {
        None => return CycleAction::StartNew,
        Some(started) => started,
    };

    if status.in_progress() {
        return CycleAction::Resume;
    }

    let elapsed = day_difference(started, now);
    if elapsed < frequency_days {
        CycleAction::Wait {
            remaining_days: frequency_days - elapsed,
        }
    } else {
        CycleAction::ResetAndStart
    }
}
