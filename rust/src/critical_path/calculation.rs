//! Critical path calculation using forward and backward passes.
//!
//! Both passes run on integer milli-hours. Durations, lags and actual-date
//! offsets are converted once up front, so float is exact and a driving
//! relationship has a slack of exactly zero.

use chrono::NaiveDateTime;

use crate::calendar::{to_hours, to_milli_hours, MilliHours};
use crate::config::EngineConfig;
use crate::error::ConstraintViolationWarning;
use crate::graph::DependencyGraph;
use crate::models::{Activity, ActivityStatus, Bound, RelationshipType, ScheduleData};
use crate::{log_checks, log_debug};

use super::chain::extract_critical_chain;
use super::types::{ActivityTiming, CriticalPathResult};

/// How far the successor sits beyond the constraint the predecessor imposes.
///
/// Zero means the relationship drives the successor.
pub(crate) fn edge_slack(
    relationship_type: RelationshipType,
    lag: MilliHours,
    pred: &ActivityTiming,
    succ: &ActivityTiming,
) -> MilliHours {
    match relationship_type.forward_bound(pred.early_start, pred.early_finish, lag) {
        Bound::Start(t) => succ.early_start - t,
        Bound::Finish(t) => succ.early_finish - t,
    }
}

/// Activities ordered the same way the graph index numbers them.
pub(crate) fn activities_by_node(data: &ScheduleData) -> Vec<&Activity> {
    let mut by_node: Vec<&Activity> = data.activities.iter().collect();
    by_node.sort_by(|a, b| a.id.cmp(&b.id));
    by_node.dedup_by(|a, b| a.id == b.id);
    by_node
}

/// Run both passes and derive float, criticality and warnings.
///
/// `graph` must have been built from `data`. The result is a pure function of
/// its inputs: the same data always yields identical values.
pub fn calculate_critical_path(
    data: &ScheduleData,
    graph: &DependencyGraph,
    config: &EngineConfig,
) -> CriticalPathResult {
    let n = graph.len();
    let calendar = config.calendar();
    let epsilon = config.float_epsilon_hours;
    let verbosity = config.verbosity;
    let by_node = activities_by_node(data);
    let offset = |dt: NaiveDateTime| calendar.offset(data.project_start, dt);
    let remaining: Vec<MilliHours> = by_node
        .iter()
        .map(|activity| to_milli_hours(activity.remaining_duration_hours).max(0))
        .collect();

    let mut timings = vec![ActivityTiming::default(); n];
    let mut warnings: Vec<ConstraintViolationWarning> = Vec::new();

    // Forward pass: compute early start/finish in topological order
    for &node in graph.topo_order() {
        let idx = node as usize;
        let activity = by_node[idx];
        let duration = remaining[idx];

        let bounds: Vec<(usize, Bound)> = graph.predecessors[idx]
            .iter()
            .map(|edge| {
                let pred = &timings[edge.node as usize];
                let bound = edge
                    .relationship_type
                    .forward_bound(pred.early_start, pred.early_finish, edge.lag);
                (edge.relationship, bound)
            })
            .collect();

        let (early_start, early_finish) = match activity.status {
            ActivityStatus::NotStarted => {
                let start = bounds
                    .iter()
                    .map(|(_, bound)| bound.as_start(duration))
                    .fold(0, MilliHours::max);
                (start, start + duration)
            }
            ActivityStatus::InProgress => {
                let start = offset(activity.actual_start.unwrap_or(activity.planned_start));
                (start, start + duration)
            }
            ActivityStatus::Completed => {
                let start = offset(activity.actual_start.unwrap_or(activity.planned_start));
                let finish = activity.actual_finish.map(offset).unwrap_or(start).max(start);
                (start, finish)
            }
        };

        if activity.status.is_started() {
            let span = early_finish - early_start;
            for (relationship, bound) in &bounds {
                let required_start = bound.as_start(span);
                if required_start > early_start {
                    let warning = ConstraintViolationWarning {
                        activity_id: activity.id.clone(),
                        relationship_id: data.relationships[*relationship].id.clone(),
                        required_start_hours: to_hours(required_start),
                        actual_start_hours: to_hours(early_start),
                    };
                    log_checks!(verbosity, "{}", warning);
                    warnings.push(warning);
                }
            }
        }

        timings[idx].early_start = early_start;
        timings[idx].early_finish = early_finish;
    }

    let project_finish = timings.iter().map(|t| t.early_finish).fold(0, MilliHours::max);

    // Backward pass: compute late start/finish in reverse topological order
    for &node in graph.topo_order().iter().rev() {
        let idx = node as usize;
        let activity = by_node[idx];

        if activity.status == ActivityStatus::Completed {
            // Finished work is pinned to its actual dates
            let timing = &mut timings[idx];
            timing.late_start = timing.early_start;
            timing.late_finish = timing.early_finish;
            timing.total_float = 0;
            timing.free_float = 0;
            continue;
        }

        let duration = remaining[idx];
        let mut late_finish = project_finish;
        let mut free_float: Option<MilliHours> = None;

        for edge in &graph.successors[idx] {
            let succ_idx = edge.node as usize;
            if by_node[succ_idx].status == ActivityStatus::Completed {
                continue;
            }
            let succ = timings[succ_idx];
            let bound = edge
                .relationship_type
                .backward_bound(succ.late_start, succ.late_finish, edge.lag);
            late_finish = late_finish.min(bound.as_finish(duration));
            let slack = edge_slack(edge.relationship_type, edge.lag, &timings[idx], &succ);
            free_float = Some(free_float.map_or(slack, |f| f.min(slack)));
        }

        let timing = &mut timings[idx];
        timing.late_finish = late_finish;
        timing.late_start = late_finish - duration;
        timing.total_float = timing.late_start - timing.early_start;
        timing.free_float = free_float.unwrap_or(project_finish - timing.early_finish);

        if to_hours(timing.float_mismatch()) > epsilon {
            log_checks!(
                verbosity,
                "activity {} float mismatch {}h exceeds epsilon {}h",
                activity.id,
                to_hours(timing.float_mismatch()),
                epsilon
            );
        }
        log_debug!(
            verbosity,
            "activity {}: ES={} EF={} LS={} LF={} TF={} (milli-hours)",
            activity.id,
            timing.early_start,
            timing.early_finish,
            timing.late_start,
            timing.late_finish,
            timing.total_float
        );
    }

    let critical: Vec<bool> = (0..n)
        .map(|idx| by_node[idx].status != ActivityStatus::Completed && timings[idx].is_critical())
        .collect();

    // Completed work keeps is_critical=false; its history goes to a separate flag
    let mut was_on_critical_path = vec![false; n];
    for &node in graph.topo_order().iter().rev() {
        let idx = node as usize;
        if by_node[idx].status != ActivityStatus::Completed {
            continue;
        }
        was_on_critical_path[idx] = graph.successors[idx].iter().any(|edge| {
            let succ_idx = edge.node as usize;
            (critical[succ_idx] || was_on_critical_path[succ_idx])
                && edge_slack(edge.relationship_type, edge.lag, &timings[idx], &timings[succ_idx]) <= 0
        });
    }

    let critical_chain = extract_critical_chain(graph, &timings, &critical, project_finish);

    CriticalPathResult {
        timings,
        critical,
        was_on_critical_path,
        warnings,
        project_finish,
        critical_chain,
    }
}
