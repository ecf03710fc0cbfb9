//! Dependency graph over the relationships of one batch.
//!
//! Cycle detection is an iterative three-colour DFS; the same routine
//! validates WBS parent chains.

use crate::calendar::{to_milli_hours, MilliHours};
use crate::error::CycleError;
use crate::interner::{ActivityIndex, NodeIdx};
use crate::models::{Activity, Relationship, RelationshipType};

/// One directed edge as seen from either endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    /// The activity at the other end of the edge.
    pub node: NodeIdx,
    /// Position of the relationship in the batch's relationship list.
    pub relationship: usize,
    pub relationship_type: RelationshipType,
    pub lag: MilliHours,
}

/// Adjacency structure plus a topological order, built only for DAGs.
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    pub index: ActivityIndex,
    pub successors: Vec<Vec<Edge>>,
    pub predecessors: Vec<Vec<Edge>>,
    topo_order: Vec<NodeIdx>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Topologically sort `adjacency` (node -> targets).
///
/// Returns the nodes in topological order, or the nodes along the first cycle
/// found with the starting node repeated at the end. Roots are visited in
/// index order so the result is deterministic.
pub fn three_color_sort(adjacency: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = adjacency.len();
    let mut color = vec![Color::White; n];
    let mut postorder = Vec::with_capacity(n);
    // (node, position of the next child to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if color[root] != Color::White {
            continue;
        }
        color[root] = Color::Gray;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if let Some(&child) = adjacency[node].get(frame.1) {
                frame.1 += 1;
                match color[child] {
                    Color::White => {
                        color[child] = Color::Gray;
                        stack.push((child, 0));
                    }
                    Color::Gray => {
                        let from = stack.iter().position(|&(on_path, _)| on_path == child).unwrap_or(0);
                        let mut cycle: Vec<usize> =
                            stack[from..].iter().map(|&(on_path, _)| on_path).collect();
                        cycle.push(child);
                        return Err(cycle);
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                postorder.push(node);
                stack.pop();
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}

impl DependencyGraph {
    /// Build the graph and verify it is acyclic.
    ///
    /// Relationships whose endpoints are not among `activities` are ignored;
    /// import validation rejects them before they reach this point.
    pub fn build(activities: &[Activity], relationships: &[Relationship]) -> Result<Self, CycleError> {
        let index = ActivityIndex::from_ids(activities.iter().map(|a| a.id.as_str()));
        let n = index.len();
        let mut successors: Vec<Vec<Edge>> = vec![Vec::new(); n];
        let mut predecessors: Vec<Vec<Edge>> = vec![Vec::new(); n];

        for (pos, rel) in relationships.iter().enumerate() {
            let lag = to_milli_hours(rel.lag_hours);
            let (Some(pred), Some(succ)) = (
                index.get(&rel.predecessor_activity_id),
                index.get(&rel.successor_activity_id),
            ) else {
                continue;
            };
            successors[pred as usize].push(Edge {
                node: succ,
                relationship: pos,
                relationship_type: rel.relationship_type,
                lag,
            });
            predecessors[succ as usize].push(Edge {
                node: pred,
                relationship: pos,
                relationship_type: rel.relationship_type,
                lag,
            });
        }

        // Stable adjacency order regardless of the order relationships arrived in
        for edges in successors.iter_mut().chain(predecessors.iter_mut()) {
            edges.sort_by(|a, b| {
                a.node
                    .cmp(&b.node)
                    .then_with(|| relationships[a.relationship].id.cmp(&relationships[b.relationship].id))
            });
        }

        let adjacency: Vec<Vec<usize>> = successors
            .iter()
            .map(|edges| edges.iter().map(|e| e.node as usize).collect())
            .collect();

        let topo_order = three_color_sort(&adjacency)
            .map_err(|cycle| CycleError {
                activity_ids: cycle
                    .into_iter()
                    .map(|idx| index.id(idx as NodeIdx).to_string())
                    .collect(),
            })?
            .into_iter()
            .map(|idx| idx as NodeIdx)
            .collect();

        Ok(Self {
            index,
            successors,
            predecessors,
            topo_order,
        })
    }

    /// Activities ordered so every predecessor precedes its successors.
    pub fn topo_order(&self) -> &[NodeIdx] {
        &self.topo_order
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
