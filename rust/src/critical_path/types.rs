//! Types for critical path calculation.

use crate::calendar::MilliHours;
use crate::error::ConstraintViolationWarning;
use crate::interner::NodeIdx;

/// Per-activity timing in milli-hours from the project start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivityTiming {
    /// Earliest possible start time (from forward pass).
    pub early_start: MilliHours,
    /// Earliest possible finish time (from forward pass).
    pub early_finish: MilliHours,
    /// Latest allowable start time (from backward pass).
    pub late_start: MilliHours,
    /// Latest allowable finish time (from backward pass).
    pub late_finish: MilliHours,
    /// late_start - early_start. Negative values signal an overrun.
    pub total_float: MilliHours,
    /// Slack before the earliest successor constraint moves.
    pub free_float: MilliHours,
}

impl ActivityTiming {
    /// Whether total float is zero or negative.
    pub fn is_critical(&self) -> bool {
        self.total_float <= 0
    }

    /// Difference between the start-based and finish-based float formulations.
    pub fn float_mismatch(&self) -> MilliHours {
        ((self.late_finish - self.early_finish) - self.total_float).abs()
    }
}

/// Output of the two passes over one dependency graph, indexed by `NodeIdx`.
#[derive(Clone, Debug, Default)]
pub struct CriticalPathResult {
    pub timings: Vec<ActivityTiming>,
    pub critical: Vec<bool>,
    /// Completed activities whose finish drove the critical path.
    pub was_on_critical_path: Vec<bool>,
    pub warnings: Vec<ConstraintViolationWarning>,
    /// Latest early finish across all activities.
    pub project_finish: MilliHours,
    /// One ordered chain of critical activities from a start anchor to a finish anchor.
    pub critical_chain: Vec<NodeIdx>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_timing_critical() {
        let timing = ActivityTiming {
            early_start: 0,
            early_finish: 40_000,
            late_start: 0,
            late_finish: 40_000,
            total_float: 0,
            free_float: 0,
        };
        assert!(timing.is_critical());

        let with_float = ActivityTiming {
            late_start: 16_000,
            late_finish: 56_000,
            total_float: 16_000,
            ..timing
        };
        assert!(!with_float.is_critical());
        assert_eq!(with_float.float_mismatch(), 0);

        // A single milli-hour of float is enough to leave the path
        let barely = ActivityTiming {
            total_float: 1,
            ..timing
        };
        assert!(!barely.is_critical());
    }

    #[test]
    fn test_negative_float_is_critical() {
        let overrun = ActivityTiming {
            total_float: -250,
            ..ActivityTiming::default()
        };
        assert!(overrun.is_critical());
    }
}
