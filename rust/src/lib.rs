//! Construction schedule engine: critical path method over imported
//! activity networks.
//!
//! Schedule data (activities, precedence relationships and a work breakdown
//! structure) is imported per project, turned into a dependency graph,
//! scheduled with a forward and a backward pass, rolled up over the WBS and
//! published as an immutable snapshot. [`ScheduleStore`] ties the pieces
//! together; each stage is usable on its own.

// Allow clippy warning triggered by PyO3 macro expansion
#![cfg_attr(feature = "python", allow(clippy::useless_conversion))]

pub mod calendar;
pub mod config;
pub mod coordinator;
pub mod critical_path;
pub mod error;
pub mod graph;
pub mod import;
pub mod interner;
pub mod logging;
pub mod models;
pub mod snapshot;
pub mod wbs;

#[cfg(feature = "python")]
mod python;

pub use calendar::{to_hours, to_milli_hours, MilliHours, WorkCalendar};
pub use config::EngineConfig;
pub use coordinator::{ImportOutcome, ProjectStatus, RecalcState, ScheduleStore};
pub use critical_path::{calculate_critical_path, ActivityTiming, CriticalPathResult};
pub use error::{ConstraintViolationWarning, CycleError, EntityKind, ScheduleError, ValidationIssue};
pub use graph::DependencyGraph;
pub use import::{parse_json, parse_xer, PayloadHeader, SchedulePayload};
pub use models::{
    Activity, ActivityLinks, ActivityStatus, ImportBatch, NewRelationship, ProgressUpdate, Relationship,
    RelationshipType, ScheduleData, WbsNode,
};
pub use snapshot::{recompute, ComputedActivity, ComputedSchedule, PredecessorLink, PublishedSnapshot};
pub use wbs::{aggregate_wbs, WbsRollup, WbsTree};
