//! Extraction of one ordered critical chain for display.

use std::cmp::Ordering;

use crate::calendar::MilliHours;
use crate::graph::{DependencyGraph, Edge};
use crate::interner::NodeIdx;

use super::calculation::edge_slack;
use super::types::ActivityTiming;

fn earlier(timings: &[ActivityTiming], a: NodeIdx, b: NodeIdx) -> Ordering {
    timings[a as usize]
        .early_start
        .cmp(&timings[b as usize].early_start)
        .then(a.cmp(&b))
}

/// Pick one chain of critical activities linked by driving relationships,
/// from an activity with no driving critical predecessor to one finishing at
/// the project finish. Ties go to the earlier start, then the lower index.
///
/// Returns an empty chain when no critical activity reaches the finish.
pub fn extract_critical_chain(
    graph: &DependencyGraph,
    timings: &[ActivityTiming],
    critical: &[bool],
    project_finish: MilliHours,
) -> Vec<NodeIdx> {
    let n = graph.len();
    let driving = |from: usize, edge: &Edge| {
        critical[edge.node as usize]
            && edge_slack(
                edge.relationship_type,
                edge.lag,
                &timings[from],
                &timings[edge.node as usize],
            ) <= 0
    };

    // Which critical activities can still reach the finish through driving links
    let mut reaches_end = vec![false; n];
    for &node in graph.topo_order().iter().rev() {
        let idx = node as usize;
        if !critical[idx] {
            continue;
        }
        reaches_end[idx] = timings[idx].early_finish >= project_finish
            || graph.successors[idx]
                .iter()
                .any(|edge| driving(idx, edge) && reaches_end[edge.node as usize]);
    }

    let mut driven = vec![false; n];
    for idx in 0..n {
        if !critical[idx] {
            continue;
        }
        for edge in &graph.successors[idx] {
            if driving(idx, edge) {
                driven[edge.node as usize] = true;
            }
        }
    }

    let Some(mut current) = (0..n as NodeIdx)
        .filter(|&idx| reaches_end[idx as usize] && !driven[idx as usize])
        .min_by(|&a, &b| earlier(timings, a, b))
    else {
        return Vec::new();
    };

    let mut chain = vec![current];
    loop {
        let from = current as usize;
        let next = graph.successors[from]
            .iter()
            .filter(|edge| driving(from, edge) && reaches_end[edge.node as usize])
            .map(|edge| edge.node)
            .min_by(|&a, &b| earlier(timings, a, b));
        match next {
            Some(node) => {
                chain.push(node);
                current = node;
            }
            None => break,
        }
    }
    chain
}
