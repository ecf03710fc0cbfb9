//! Error and warning types surfaced by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::{ActivityId, RelationshipId, WbsId};

/// A single reason an import or structural edit was rejected.
#[derive(Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationIssue {
    #[error("duplicate activity id {id}")]
    DuplicateActivity { id: ActivityId },
    #[error("duplicate relationship id {id}")]
    DuplicateRelationship { id: RelationshipId },
    #[error("duplicate WBS id {id}")]
    DuplicateWbs { id: WbsId },
    #[error("relationship {relationship_id} references unknown predecessor {activity_id}")]
    DanglingPredecessor {
        relationship_id: RelationshipId,
        activity_id: ActivityId,
    },
    #[error("relationship {relationship_id} references unknown successor {activity_id}")]
    DanglingSuccessor {
        relationship_id: RelationshipId,
        activity_id: ActivityId,
    },
    #[error("relationship {relationship_id} links activity {activity_id} to itself")]
    SelfRelationship {
        relationship_id: RelationshipId,
        activity_id: ActivityId,
    },
    #[error("activity {activity_id} references unknown WBS node {wbs_id}")]
    DanglingWbs { activity_id: ActivityId, wbs_id: WbsId },
    #[error("WBS node {wbs_id} references unknown parent {parent_id}")]
    DanglingWbsParent { wbs_id: WbsId, parent_id: WbsId },
    #[error("WBS parent chain forms a cycle: {}", .wbs_ids.join(" -> "))]
    WbsCycle { wbs_ids: Vec<WbsId> },
    #[error("activity {activity_id} has percent complete {value} outside 0..=100")]
    PercentOutOfRange { activity_id: ActivityId, value: f64 },
    #[error("activity {activity_id} has invalid {field}: {value}")]
    InvalidDuration {
        activity_id: ActivityId,
        field: String,
        value: f64,
    },
    #[error("relationship {relationship_id} has invalid lag: {value}")]
    InvalidLag { relationship_id: RelationshipId, value: f64 },
    #[error("activity {activity_id} is {status} but has no {field}")]
    MissingActualDate {
        activity_id: ActivityId,
        status: String,
        field: String,
    },
    #[error("activity {activity_id} finishes before it starts")]
    ActualFinishBeforeStart { activity_id: ActivityId },
}

/// The relationship set is not a DAG.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("circular dependency detected: {}", .activity_ids.join(" -> "))]
pub struct CycleError {
    /// Activities along the cycle; the first id is repeated at the end.
    pub activity_ids: Vec<ActivityId>,
}

/// Kind of entity a lookup failed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Project,
    Activity,
    Relationship,
    WbsNode,
    Batch,
    Snapshot,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Project => "project",
            EntityKind::Activity => "activity",
            EntityKind::Relationship => "relationship",
            EntityKind::WbsNode => "WBS node",
            EntityKind::Batch => "import batch",
            EntityKind::Snapshot => "schedule snapshot",
        };
        f.write_str(name)
    }
}

/// Errors returned by import, mutation and query operations.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("schedule rejected with {} validation issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },
    #[error("payload exceeds the {what} limit of {limit} (got {actual})")]
    PayloadTooLarge {
        what: &'static str,
        limit: usize,
        actual: usize,
    },
    #[error("malformed schedule payload: {0}")]
    Parse(String),
}

impl ScheduleError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        ScheduleError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Validation issues carried by this error, if any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ScheduleError::Validation(issues) => issues,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        ScheduleError::Parse(err.to_string())
    }
}

/// Non-fatal date inconsistency attached to an activity in a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolationWarning {
    pub activity_id: ActivityId,
    pub relationship_id: RelationshipId,
    /// Earliest start the relationship logic allows.
    pub required_start_hours: f64,
    /// When the activity actually started.
    pub actual_start_hours: f64,
}

impl fmt::Display for ConstraintViolationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activity {} started at {}h but relationship {} requires {}h",
            self.activity_id, self.actual_start_hours, self.relationship_id, self.required_start_hours
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message() {
        let err = CycleError {
            activity_ids: vec!["A".into(), "B".into(), "C".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: A -> B -> C -> A");
        let wrapped: ScheduleError = err.into();
        assert!(matches!(wrapped, ScheduleError::Cycle(_)));
    }

    #[test]
    fn test_validation_error_counts_issues() {
        let err = ScheduleError::Validation(vec![
            ValidationIssue::DuplicateActivity { id: "A".into() },
            ValidationIssue::DanglingWbs {
                activity_id: "B".into(),
                wbs_id: "W9".into(),
            },
        ]);
        assert_eq!(err.to_string(), "schedule rejected with 2 validation issue(s)");
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn test_not_found_message() {
        let err = ScheduleError::not_found(EntityKind::WbsNode, "W1");
        assert_eq!(err.to_string(), "WBS node not found: W1");
    }
}
