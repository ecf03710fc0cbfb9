//! Core data types for schedule data: activities, relationships, WBS nodes
//! and import batches.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calendar::MilliHours;

pub type ActivityId = String;
pub type RelationshipId = String;
pub type WbsId = String;
pub type ProjectId = String;
pub type BatchId = u64;

/// Progress state of an activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    #[serde(alias = "TK_NotStart")]
    NotStarted,
    #[serde(alias = "TK_Active")]
    InProgress,
    #[serde(alias = "TK_Complete")]
    Completed,
}

impl ActivityStatus {
    /// Whether work has begun (an actual start is expected).
    pub fn is_started(self) -> bool {
        !matches!(self, ActivityStatus::NotStarted)
    }
}

impl FromStr for ActivityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NOT_STARTED" | "TK_NotStart" => Ok(Self::NotStarted),
            "IN_PROGRESS" | "TK_Active" => Ok(Self::InProgress),
            "COMPLETED" | "TK_Complete" => Ok(Self::Completed),
            other => Err(format!("unknown activity status: {other}")),
        }
    }
}

/// A schedulable unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub external_activity_id: String,
    pub name: String,
    pub status: ActivityStatus,
    pub percent_complete: f64,
    pub planned_start: NaiveDateTime,
    pub planned_finish: NaiveDateTime,
    #[serde(default)]
    pub actual_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub actual_finish: Option<NaiveDateTime>,
    pub planned_duration_hours: f64,
    pub remaining_duration_hours: f64,
    /// Float as reported by the source system; informational only.
    #[serde(default)]
    pub total_float_hours: Option<f64>,
    #[serde(default)]
    pub wbs_id: Option<WbsId>,
}

/// Which end of an activity a constraint binds, in milli-hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    /// Bound on the activity's start.
    Start(MilliHours),
    /// Bound on the activity's finish.
    Finish(MilliHours),
}

impl Bound {
    /// Express the bound as a start time for an activity of `duration`.
    pub fn as_start(self, duration: MilliHours) -> MilliHours {
        match self {
            Bound::Start(t) => t,
            Bound::Finish(t) => t - duration,
        }
    }

    /// Express the bound as a finish time for an activity of `duration`.
    pub fn as_finish(self, duration: MilliHours) -> MilliHours {
        match self {
            Bound::Start(t) => t + duration,
            Bound::Finish(t) => t,
        }
    }
}

/// Precedence relationship type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    #[serde(rename = "FINISH_TO_START", alias = "FS", alias = "PR_FS")]
    FinishToStart,
    #[serde(rename = "START_TO_START", alias = "SS", alias = "PR_SS")]
    StartToStart,
    #[serde(rename = "FINISH_TO_FINISH", alias = "FF", alias = "PR_FF")]
    FinishToFinish,
    #[serde(rename = "START_TO_FINISH", alias = "SF", alias = "PR_SF")]
    StartToFinish,
}

impl RelationshipType {
    /// Earliest-date constraint a predecessor places on its successor.
    ///
    /// FS: succ.ES >= pred.EF + lag, SS: succ.ES >= pred.ES + lag,
    /// FF: succ.EF >= pred.EF + lag, SF: succ.EF >= pred.ES + lag.
    pub fn forward_bound(self, pred_early_start: MilliHours, pred_early_finish: MilliHours, lag: MilliHours) -> Bound {
        match self {
            RelationshipType::FinishToStart => Bound::Start(pred_early_finish + lag),
            RelationshipType::StartToStart => Bound::Start(pred_early_start + lag),
            RelationshipType::FinishToFinish => Bound::Finish(pred_early_finish + lag),
            RelationshipType::StartToFinish => Bound::Finish(pred_early_start + lag),
        }
    }

    /// Latest-date constraint a successor places on its predecessor.
    ///
    /// FS: pred.LF <= succ.LS - lag, SS: pred.LS <= succ.LS - lag,
    /// FF: pred.LF <= succ.LF - lag, SF: pred.LS <= succ.LF - lag.
    pub fn backward_bound(self, succ_late_start: MilliHours, succ_late_finish: MilliHours, lag: MilliHours) -> Bound {
        match self {
            RelationshipType::FinishToStart => Bound::Finish(succ_late_start - lag),
            RelationshipType::StartToStart => Bound::Start(succ_late_start - lag),
            RelationshipType::FinishToFinish => Bound::Finish(succ_late_finish - lag),
            RelationshipType::StartToFinish => Bound::Start(succ_late_finish - lag),
        }
    }

    pub fn short_code(self) -> &'static str {
        match self {
            RelationshipType::FinishToStart => "FS",
            RelationshipType::StartToStart => "SS",
            RelationshipType::FinishToFinish => "FF",
            RelationshipType::StartToFinish => "SF",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_code())
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FS" | "PR_FS" | "FINISH_TO_START" => Ok(Self::FinishToStart),
            "SS" | "PR_SS" | "START_TO_START" => Ok(Self::StartToStart),
            "FF" | "PR_FF" | "FINISH_TO_FINISH" => Ok(Self::FinishToFinish),
            "SF" | "PR_SF" | "START_TO_FINISH" => Ok(Self::StartToFinish),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}

/// A precedence link between two activities with a signed lag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub predecessor_activity_id: ActivityId,
    pub successor_activity_id: ActivityId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub lag_hours: f64,
}

/// A node in the work breakdown structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WbsNode {
    pub id: WbsId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<WbsId>,
    #[serde(default)]
    pub sort_order: i64,
}

/// The schedule content of one batch: everything a recompute reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleData {
    /// Origin of the working-hour axis.
    pub project_start: NaiveDateTime,
    pub activities: Vec<Activity>,
    pub relationships: Vec<Relationship>,
    pub wbs: Vec<WbsNode>,
}

impl ScheduleData {
    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn activity_mut(&mut self, id: &str) -> Option<&mut Activity> {
        self.activities.iter_mut().find(|a| a.id == id)
    }
}

/// Immutable record of one successful import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub id: BatchId,
    pub project_id: ProjectId,
    pub file_name: String,
    pub imported_at: DateTime<Utc>,
    pub source_project_name: String,
    pub project_start: NaiveDateTime,
    pub activities_count: usize,
    pub relationships_count: usize,
    pub wbs_count: usize,
}

/// Association between an activity and items owned by the task service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLinks {
    pub linked_task_id: Option<String>,
    pub linked_milestone_id: Option<String>,
}

impl ActivityLinks {
    pub fn is_empty(&self) -> bool {
        self.linked_task_id.is_none() && self.linked_milestone_id.is_none()
    }
}

/// Progress fields a progress update may change. `None` leaves a field as is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: Option<ActivityStatus>,
    pub percent_complete: Option<f64>,
    pub actual_start: Option<NaiveDateTime>,
    pub actual_finish: Option<NaiveDateTime>,
    pub remaining_duration_hours: Option<f64>,
}

/// A relationship to add to the active batch. Without an id the store assigns one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelationship {
    #[serde(default)]
    pub id: Option<RelationshipId>,
    pub predecessor_activity_id: ActivityId,
    pub successor_activity_id: ActivityId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub lag_hours: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_bounds_per_type() {
        // pred ES=10, EF=50, lag 4
        assert_eq!(
            RelationshipType::FinishToStart.forward_bound(10, 50, 4),
            Bound::Start(54)
        );
        assert_eq!(
            RelationshipType::StartToStart.forward_bound(10, 50, 4),
            Bound::Start(14)
        );
        assert_eq!(
            RelationshipType::FinishToFinish.forward_bound(10, 50, 4),
            Bound::Finish(54)
        );
        assert_eq!(
            RelationshipType::StartToFinish.forward_bound(10, 50, 4),
            Bound::Finish(14)
        );
    }

    #[test]
    fn test_backward_bounds_per_type() {
        // succ LS=100, LF=140, lag -8 (overlap)
        assert_eq!(
            RelationshipType::FinishToStart.backward_bound(100, 140, -8),
            Bound::Finish(108)
        );
        assert_eq!(
            RelationshipType::StartToStart.backward_bound(100, 140, -8),
            Bound::Start(108)
        );
        assert_eq!(
            RelationshipType::FinishToFinish.backward_bound(100, 140, -8),
            Bound::Finish(148)
        );
        assert_eq!(
            RelationshipType::StartToFinish.backward_bound(100, 140, -8),
            Bound::Start(148)
        );
    }

    #[test]
    fn test_bound_conversion() {
        assert_eq!(Bound::Finish(40).as_start(16), 24);
        assert_eq!(Bound::Start(40).as_finish(16), 56);
        assert_eq!(Bound::Start(40).as_start(16), 40);
    }

    #[test]
    fn test_relationship_type_codes() {
        for code in ["FS", "PR_FS", "FINISH_TO_START"] {
            assert_eq!(code.parse::<RelationshipType>(), Ok(RelationshipType::FinishToStart));
        }
        assert_eq!("PR_SF".parse::<RelationshipType>(), Ok(RelationshipType::StartToFinish));
        assert!("XX".parse::<RelationshipType>().is_err());

        let parsed: RelationshipType = serde_json::from_str("\"SS\"").unwrap();
        assert_eq!(parsed, RelationshipType::StartToStart);
        assert_eq!(
            serde_json::to_string(&RelationshipType::FinishToFinish).unwrap(),
            "\"FINISH_TO_FINISH\""
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("TK_Active".parse::<ActivityStatus>(), Ok(ActivityStatus::InProgress));
        let parsed: ActivityStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, ActivityStatus::Completed);
        assert!(!ActivityStatus::NotStarted.is_started());
        assert!(ActivityStatus::InProgress.is_started());
    }
}
