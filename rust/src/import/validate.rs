//! Referential and value checks for schedule data.
//!
//! Every check runs to completion; callers get the full list of issues.

use rustc_hash::FxHashSet;

use crate::config::EngineConfig;
use crate::error::ValidationIssue;
use crate::models::{Activity, ActivityStatus, Relationship, ScheduleData};
use crate::wbs::validate_wbs;

fn status_label(status: ActivityStatus) -> String {
    match status {
        ActivityStatus::NotStarted => "NOT_STARTED",
        ActivityStatus::InProgress => "IN_PROGRESS",
        ActivityStatus::Completed => "COMPLETED",
    }
    .to_string()
}

/// Value checks on a single activity, independent of the rest of the batch.
pub fn validate_activity(activity: &Activity, config: &EngineConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let id = &activity.id;

    if !(0.0..=100.0).contains(&activity.percent_complete) {
        issues.push(ValidationIssue::PercentOutOfRange {
            activity_id: id.clone(),
            value: activity.percent_complete,
        });
    }

    for (field, value) in [
        ("plannedDurationHours", activity.planned_duration_hours),
        ("remainingDurationHours", activity.remaining_duration_hours),
    ] {
        if !value.is_finite() || value < 0.0 || value > config.max_duration_hours {
            issues.push(ValidationIssue::InvalidDuration {
                activity_id: id.clone(),
                field: field.to_string(),
                value,
            });
        }
    }

    if activity.status.is_started() && activity.actual_start.is_none() {
        issues.push(ValidationIssue::MissingActualDate {
            activity_id: id.clone(),
            status: status_label(activity.status),
            field: "actualStart".to_string(),
        });
    }
    if activity.status == ActivityStatus::Completed && activity.actual_finish.is_none() {
        issues.push(ValidationIssue::MissingActualDate {
            activity_id: id.clone(),
            status: status_label(activity.status),
            field: "actualFinish".to_string(),
        });
    }
    if let (Some(start), Some(finish)) = (activity.actual_start, activity.actual_finish) {
        if finish < start {
            issues.push(ValidationIssue::ActualFinishBeforeStart {
                activity_id: id.clone(),
            });
        }
    }
    issues
}

/// Checks a relationship against the set of known activity ids.
pub fn validate_relationship(
    relationship: &Relationship,
    activity_ids: &FxHashSet<&str>,
    config: &EngineConfig,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let pred = relationship.predecessor_activity_id.as_str();
    let succ = relationship.successor_activity_id.as_str();

    if !activity_ids.contains(pred) {
        issues.push(ValidationIssue::DanglingPredecessor {
            relationship_id: relationship.id.clone(),
            activity_id: pred.to_string(),
        });
    }
    if !activity_ids.contains(succ) {
        issues.push(ValidationIssue::DanglingSuccessor {
            relationship_id: relationship.id.clone(),
            activity_id: succ.to_string(),
        });
    }
    if pred == succ {
        issues.push(ValidationIssue::SelfRelationship {
            relationship_id: relationship.id.clone(),
            activity_id: pred.to_string(),
        });
    }
    let lag = relationship.lag_hours;
    if !lag.is_finite() || lag.abs() > config.max_duration_hours {
        issues.push(ValidationIssue::InvalidLag {
            relationship_id: relationship.id.clone(),
            value: lag,
        });
    }
    issues
}

/// Validate a whole batch: ids, references, WBS structure and values.
pub fn validate_schedule(data: &ScheduleData, config: &EngineConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let mut activity_ids: FxHashSet<&str> = FxHashSet::default();
    for activity in &data.activities {
        if !activity_ids.insert(activity.id.as_str()) {
            issues.push(ValidationIssue::DuplicateActivity {
                id: activity.id.clone(),
            });
        }
        issues.extend(validate_activity(activity, config));
    }

    let mut relationship_ids: FxHashSet<&str> = FxHashSet::default();
    for relationship in &data.relationships {
        if !relationship_ids.insert(relationship.id.as_str()) {
            issues.push(ValidationIssue::DuplicateRelationship {
                id: relationship.id.clone(),
            });
        }
        issues.extend(validate_relationship(relationship, &activity_ids, config));
    }

    let wbs_ids: FxHashSet<&str> = data.wbs.iter().map(|node| node.id.as_str()).collect();
    issues.extend(validate_wbs(&data.wbs));
    for activity in &data.activities {
        if let Some(wbs_id) = activity.wbs_id.as_deref() {
            if !wbs_ids.contains(wbs_id) {
                issues.push(ValidationIssue::DanglingWbs {
                    activity_id: activity.id.clone(),
                    wbs_id: wbs_id.to_string(),
                });
            }
        }
    }

    issues
}
