//! Computed schedule state and the pure recompute that produces it.

use chrono::{DateTime, NaiveDateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::calendar::to_hours;
use crate::config::EngineConfig;
use crate::critical_path::{activities_by_node, calculate_critical_path};
use crate::error::{ConstraintViolationWarning, CycleError};
use crate::graph::DependencyGraph;
use crate::models::{ActivityId, ActivityStatus, BatchId, ProjectId, RelationshipId, RelationshipType, ScheduleData, WbsId};
use crate::wbs::{aggregate_wbs, WbsContribution, WbsRollup, WbsTree};

/// One incoming relationship as listed on its successor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredecessorLink {
    pub relationship_id: RelationshipId,
    pub activity_id: ActivityId,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub lag_hours: f64,
}

/// An activity with its computed dates, float and flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedActivity {
    pub activity_id: ActivityId,
    pub external_activity_id: String,
    pub name: String,
    pub status: ActivityStatus,
    pub percent_complete: f64,
    pub wbs_id: Option<WbsId>,
    /// WBS codes from the root down to the activity's node.
    pub wbs_path: Vec<String>,
    pub planned_duration_hours: f64,
    pub remaining_duration_hours: f64,
    pub early_start_hours: f64,
    pub early_finish_hours: f64,
    pub late_start_hours: f64,
    pub late_finish_hours: f64,
    pub early_start: NaiveDateTime,
    pub early_finish: NaiveDateTime,
    pub late_start: NaiveDateTime,
    pub late_finish: NaiveDateTime,
    pub total_float_hours: f64,
    pub free_float_hours: f64,
    pub is_critical: bool,
    pub was_on_critical_path: bool,
    pub predecessors: Vec<PredecessorLink>,
    pub warnings: Vec<ConstraintViolationWarning>,
}

/// Fully computed schedule for one batch. Equal input gives an equal value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedSchedule {
    pub project_start: NaiveDateTime,
    pub project_finish_hours: f64,
    pub project_finish: NaiveDateTime,
    /// Sorted by activity id.
    pub activities: Vec<ComputedActivity>,
    /// Ordered chain of driving critical activities.
    pub critical_path: Vec<ActivityId>,
    /// Every activity flagged critical, in id order.
    pub critical_activity_ids: Vec<ActivityId>,
    /// WBS rollups in display order.
    pub wbs: Vec<WbsRollup>,
    pub warnings: Vec<ConstraintViolationWarning>,
}

impl ComputedSchedule {
    pub fn activity(&self, activity_id: &str) -> Option<&ComputedActivity> {
        self.activities
            .binary_search_by(|a| a.activity_id.as_str().cmp(activity_id))
            .ok()
            .map(|pos| &self.activities[pos])
    }

    pub fn wbs_rollup(&self, wbs_id: &str) -> Option<&WbsRollup> {
        self.wbs.iter().find(|r| r.wbs_id == wbs_id)
    }
}

/// An immutable snapshot as published for readers.
#[derive(Clone, Debug)]
pub struct PublishedSnapshot {
    pub project_id: ProjectId,
    pub batch_id: BatchId,
    /// Increments with every successful recompute of the project.
    pub revision: u64,
    pub published_at: DateTime<Utc>,
    pub schedule: Arc<ComputedSchedule>,
}

/// Build the graph, run the passes and roll up the WBS.
///
/// Fails only when the relationships contain a cycle.
pub fn recompute(data: &ScheduleData, config: &EngineConfig) -> Result<ComputedSchedule, CycleError> {
    let graph = DependencyGraph::build(&data.activities, &data.relationships)?;
    let result = calculate_critical_path(data, &graph, config);
    let calendar = config.calendar();
    let origin = data.project_start;
    let tree = WbsTree::build(&data.wbs);
    let by_node = activities_by_node(data);

    let mut warnings_by_activity: FxHashMap<&str, Vec<ConstraintViolationWarning>> = FxHashMap::default();
    for warning in &result.warnings {
        warnings_by_activity
            .entry(warning.activity_id.as_str())
            .or_default()
            .push(warning.clone());
    }

    let activities: Vec<ComputedActivity> = by_node
        .iter()
        .enumerate()
        .map(|(idx, activity)| {
            let timing = &result.timings[idx];
            let predecessors = graph.predecessors[idx]
                .iter()
                .map(|edge| PredecessorLink {
                    relationship_id: data.relationships[edge.relationship].id.clone(),
                    activity_id: graph.index.id(edge.node).to_string(),
                    relationship_type: edge.relationship_type,
                    lag_hours: data.relationships[edge.relationship].lag_hours,
                })
                .collect();
            ComputedActivity {
                activity_id: activity.id.clone(),
                external_activity_id: activity.external_activity_id.clone(),
                name: activity.name.clone(),
                status: activity.status,
                percent_complete: activity.percent_complete,
                wbs_id: activity.wbs_id.clone(),
                wbs_path: activity
                    .wbs_id
                    .as_deref()
                    .map(|id| tree.path(id))
                    .unwrap_or_default(),
                planned_duration_hours: activity.planned_duration_hours,
                remaining_duration_hours: activity.remaining_duration_hours,
                early_start_hours: to_hours(timing.early_start),
                early_finish_hours: to_hours(timing.early_finish),
                late_start_hours: to_hours(timing.late_start),
                late_finish_hours: to_hours(timing.late_finish),
                early_start: calendar.start_datetime(origin, timing.early_start),
                early_finish: calendar.finish_datetime(origin, timing.early_finish),
                late_start: calendar.start_datetime(origin, timing.late_start),
                late_finish: calendar.finish_datetime(origin, timing.late_finish),
                total_float_hours: to_hours(timing.total_float),
                free_float_hours: to_hours(timing.free_float),
                is_critical: result.critical[idx],
                was_on_critical_path: result.was_on_critical_path[idx],
                predecessors,
                warnings: warnings_by_activity.remove(activity.id.as_str()).unwrap_or_default(),
            }
        })
        .collect();

    let contributions = by_node.iter().enumerate().filter_map(|(idx, activity)| {
        let wbs_id = activity.wbs_id.as_deref()?;
        let timing = &result.timings[idx];
        Some(WbsContribution {
            wbs_id,
            planned_duration_hours: activity.planned_duration_hours,
            percent_complete: activity.percent_complete,
            is_critical: result.critical[idx],
            early_start_hours: to_hours(timing.early_start),
            late_finish_hours: to_hours(timing.late_finish),
        })
    });
    let wbs = aggregate_wbs(&tree, contributions);

    let critical_path = result
        .critical_chain
        .iter()
        .map(|&node| graph.index.id(node).to_string())
        .collect();
    let critical_activity_ids = activities
        .iter()
        .filter(|a| a.is_critical)
        .map(|a| a.activity_id.clone())
        .collect();

    Ok(ComputedSchedule {
        project_start: origin,
        project_finish_hours: to_hours(result.project_finish),
        project_finish: calendar.finish_datetime(origin, result.project_finish),
        activities,
        critical_path,
        critical_activity_ids,
        wbs,
        warnings: result.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::models::{Activity, Relationship, WbsNode};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn make_activity(id: &str, hours: f64, wbs: Option<&str>) -> Activity {
        Activity {
            id: id.to_string(),
            external_activity_id: format!("EXT-{id}"),
            name: format!("Activity {id}"),
            status: ActivityStatus::NotStarted,
            percent_complete: 0.0,
            planned_start: at(6, 8),
            planned_finish: at(6, 8),
            actual_start: None,
            actual_finish: None,
            planned_duration_hours: hours,
            remaining_duration_hours: hours,
            total_float_hours: None,
            wbs_id: wbs.map(str::to_string),
        }
    }

    fn make_rel(id: &str, pred: &str, succ: &str, lag: f64) -> Relationship {
        Relationship {
            id: id.to_string(),
            predecessor_activity_id: pred.to_string(),
            successor_activity_id: succ.to_string(),
            relationship_type: RelationshipType::FinishToStart,
            lag_hours: lag,
        }
    }

    fn make_node(id: &str, code: &str, parent: Option<&str>) -> WbsNode {
        WbsNode {
            id: id.to_string(),
            code: code.to_string(),
            name: id.to_string(),
            parent_id: parent.map(str::to_string),
            sort_order: 0,
        }
    }

    fn reference_schedule() -> ScheduleData {
        ScheduleData {
            project_start: at(6, 8),
            activities: vec![
                make_activity("D", 16.0, Some("MEP")),
                make_activity("C", 32.0, Some("FOUND")),
                make_activity("B", 24.0, Some("FOUND")),
                make_activity("A", 40.0, Some("CIVIL")),
            ],
            relationships: vec![
                make_rel("R1", "A", "B", 0.0),
                make_rel("R2", "B", "C", 8.0),
                make_rel("R3", "A", "D", 0.0),
            ],
            wbs: vec![
                make_node("ROOT", "1", None),
                make_node("CIVIL", "1.1", Some("ROOT")),
                make_node("FOUND", "1.1.1", Some("CIVIL")),
                make_node("MEP", "1.2", Some("ROOT")),
            ],
        }
    }

    #[test]
    fn test_reference_schedule_snapshot() {
        let schedule = recompute(&reference_schedule(), &EngineConfig::default()).unwrap();

        let ids: Vec<&str> = schedule.activities.iter().map(|a| a.activity_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        assert_eq!(schedule.critical_path, vec!["A", "B", "C"]);
        assert_eq!(schedule.critical_activity_ids, vec!["A", "B", "C"]);
        assert_eq!(schedule.project_finish_hours, 104.0);
        assert_eq!(schedule.project_finish, at(18, 16));

        let c = schedule.activity("C").unwrap();
        assert_eq!(c.early_start_hours, 72.0);
        assert_eq!(c.early_start, at(15, 8));
        assert_eq!(c.wbs_path, vec!["1", "1.1", "1.1.1"]);
        assert_eq!(
            c.predecessors,
            vec![PredecessorLink {
                relationship_id: "R2".into(),
                activity_id: "B".into(),
                relationship_type: RelationshipType::FinishToStart,
                lag_hours: 8.0,
            }]
        );

        let d = schedule.activity("D").unwrap();
        assert_eq!(d.total_float_hours, 48.0);
        assert_eq!(d.late_start_hours, 88.0);
        assert!(!d.is_critical);
        assert_eq!(d.early_finish, at(12, 16));
    }

    #[test]
    fn test_wbs_rollups_in_snapshot() {
        let mut data = reference_schedule();
        data.activities[2].percent_complete = 50.0; // B
        let schedule = recompute(&data, &EngineConfig::default()).unwrap();

        let found = schedule.wbs_rollup("FOUND").unwrap();
        assert_eq!(found.activity_count, 2);
        // 24h at 50% and 32h at 0%
        assert!((found.percent_complete - 1200.0 / 56.0).abs() < 1e-9);
        assert!(found.is_critical);

        let mep = schedule.wbs_rollup("MEP").unwrap();
        assert!(!mep.is_critical);
        assert_eq!(schedule.wbs_rollup("ROOT").unwrap().activity_count, 4);
    }

    #[test]
    fn test_recompute_is_repeatable() {
        let data = reference_schedule();
        let config = EngineConfig::default();
        let first = recompute(&data, &config).unwrap();
        let second = recompute(&data, &config).unwrap();
        assert_eq!(first, second);

        let mut shuffled = data.clone();
        shuffled.activities.reverse();
        shuffled.relationships.reverse();
        shuffled.wbs.reverse();
        assert_eq!(recompute(&shuffled, &config).unwrap(), first);
    }

    #[test]
    fn test_cycle_fails_recompute() {
        let mut data = reference_schedule();
        data.relationships.push(make_rel("R4", "C", "A", 0.0));
        let err = recompute(&data, &EngineConfig::default()).unwrap_err();
        assert_eq!(err.activity_ids.first(), err.activity_ids.last());
        assert!(err.activity_ids.contains(&"C".to_string()));
    }

    #[test]
    fn test_unvalidated_extreme_durations_saturate() {
        let mut data = reference_schedule();
        let a = data.activity_mut("A").unwrap();
        a.planned_duration_hours = 1e36;
        a.remaining_duration_hours = 1e9;
        a.percent_complete = 50.0;
        let schedule = recompute(&data, &EngineConfig::default()).unwrap();

        assert_eq!(schedule.project_finish, NaiveDateTime::MAX);
        assert_eq!(schedule.critical_path, vec!["A", "B", "C"]);
        assert!(schedule.wbs_rollup("CIVIL").unwrap().percent_complete > 49.9);
    }

    #[test]
    fn test_warnings_attach_to_activity() {
        let mut data = reference_schedule();
        let b = data.activity_mut("B").unwrap();
        b.status = ActivityStatus::InProgress;
        b.actual_start = Some(at(8, 8)); // hour 16, before A can finish
        let schedule = recompute(&data, &EngineConfig::default()).unwrap();

        let b = schedule.activity("B").unwrap();
        assert_eq!(b.warnings.len(), 1);
        assert_eq!(b.warnings[0].relationship_id, "R1");
        assert_eq!(b.warnings[0].required_start_hours, 40.0);
        assert_eq!(b.warnings[0].actual_start_hours, 16.0);
        assert_eq!(schedule.warnings, b.warnings);
    }
}
