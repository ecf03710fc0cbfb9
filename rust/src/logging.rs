//! Logging macros for the schedule engine with verbosity level control.
//!
//! Events go through `tracing`, so the host decides where they land. The
//! verbosity gate keeps disabled levels free of formatting work:
//! - 0: SILENT (only errors are surfaced, as return values)
//! - 1: CHANGES (imports, published snapshots, state transitions)
//! - 2: CHECKS (validation findings, constraint warnings)
//! - 3: DEBUG (per-activity pass internals)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// `tracing` target every engine event is emitted under.
pub const TARGET: &str = "schedule_engine";

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: batch imports, snapshot publication, recalculation state changes.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            ::tracing::info!(target: $crate::logging::TARGET, $($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: rejected imports, constraint violations, float mismatches.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            ::tracing::debug!(target: $crate::logging::TARGET, $($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: forward/backward pass values per activity.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            ::tracing::trace!(target: $crate::logging::TARGET, $($arg)*);
        }
    };
}
