//! Work breakdown structure: arena validation and bottom-up rollups.
//!
//! Nodes live in an id-indexed arena with parent links. Rollups accumulate in
//! integer fixed point (milli-hours and millionths of a percent), so the
//! result does not depend on the order activities are visited in.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::calendar::to_milli_hours;
use crate::error::ValidationIssue;
use crate::graph::three_color_sort;
use crate::models::WbsNode;

/// Rolled-up values for one WBS node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WbsRollup {
    pub wbs_id: String,
    pub code: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub sort_order: i64,
    pub depth: usize,
    /// Codes from the root down to this node.
    pub path: Vec<String>,
    /// Planned-duration weighted mean of descendant progress. Inputs are
    /// taken to the nearest milli-hour and millionth of a percent.
    pub percent_complete: f64,
    pub is_critical: bool,
    pub activity_count: usize,
    pub planned_duration_hours: f64,
    pub early_start_hours: Option<f64>,
    pub late_finish_hours: Option<f64>,
}

/// What one activity contributes to the node it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct WbsContribution<'a> {
    pub wbs_id: &'a str,
    pub planned_duration_hours: f64,
    pub percent_complete: f64,
    pub is_critical: bool,
    pub early_start_hours: f64,
    pub late_finish_hours: f64,
}

/// Validate a WBS node set, collecting every issue.
pub fn validate_wbs(nodes: &[WbsNode]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut by_id: FxHashMap<&str, usize> = FxHashMap::default();
    for (pos, node) in nodes.iter().enumerate() {
        if by_id.insert(node.id.as_str(), pos).is_some() {
            issues.push(ValidationIssue::DuplicateWbs {
                id: node.id.clone(),
            });
        }
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (pos, node) in nodes.iter().enumerate() {
        let Some(parent_id) = node.parent_id.as_deref() else {
            continue;
        };
        match by_id.get(parent_id) {
            Some(&parent) => adjacency[pos].push(parent),
            None => issues.push(ValidationIssue::DanglingWbsParent {
                wbs_id: node.id.clone(),
                parent_id: parent_id.to_string(),
            }),
        }
    }

    if let Err(cycle) = three_color_sort(&adjacency) {
        issues.push(ValidationIssue::WbsCycle {
            wbs_ids: cycle.into_iter().map(|pos| nodes[pos].id.clone()).collect(),
        });
    }
    issues
}

/// Parent/child view over a validated node set.
#[derive(Clone, Debug)]
pub struct WbsTree<'a> {
    nodes: Vec<&'a WbsNode>,
    by_id: FxHashMap<&'a str, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    /// Children before parents.
    bottom_up: Vec<usize>,
}

impl<'a> WbsTree<'a> {
    /// Build the tree. Parent links that are dangling or part of a cycle are
    /// dropped, leaving those nodes as roots; `validate_wbs` reports them.
    pub fn build(nodes: &'a [WbsNode]) -> Self {
        let mut sorted: Vec<&WbsNode> = nodes.iter().collect();
        sorted.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.code.cmp(&b.code))
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted.dedup_by(|a, b| a.id == b.id);

        let by_id: FxHashMap<&str, usize> = sorted
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.id.as_str(), pos))
            .collect();
        let mut parent: Vec<Option<usize>> = sorted
            .iter()
            .map(|node| node.parent_id.as_deref().and_then(|id| by_id.get(id).copied()))
            .collect();

        let bottom_up = loop {
            let adjacency: Vec<Vec<usize>> = parent.iter().map(|p| p.iter().copied().collect()).collect();
            match three_color_sort(&adjacency) {
                Ok(order) => break order,
                Err(cycle) => {
                    // Break the cycle at its first node
                    parent[cycle[0]] = None;
                }
            }
        };

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); sorted.len()];
        for (pos, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                children[*p].push(pos);
            }
        }

        Self {
            nodes: sorted,
            by_id,
            parent,
            children,
            bottom_up,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, wbs_id: &str) -> bool {
        self.by_id.contains_key(wbs_id)
    }

    /// Codes from the root down to `wbs_id`; empty for unknown ids.
    pub fn path(&self, wbs_id: &str) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self.by_id.get(wbs_id).copied();
        while let Some(pos) = current {
            path.push(self.nodes[pos].code.clone());
            current = self.parent[pos];
        }
        path.reverse();
        path
    }

    /// Nodes in display order: siblings by sort order, parents before children.
    fn display_order(&self) -> Vec<(usize, usize)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = (0..self.nodes.len())
            .filter(|&pos| self.parent[pos].is_none())
            .rev()
            .map(|pos| (pos, 0))
            .collect();
        while let Some((pos, depth)) = stack.pop() {
            order.push((pos, depth));
            stack.extend(self.children[pos].iter().rev().map(|&child| (child, depth + 1)));
        }
        order
    }
}

/// Fixed-point units per percentage point.
const PERCENT_SCALE: f64 = 1_000_000.0;

#[derive(Clone, Copy, Debug, Default)]
struct Totals {
    count: usize,
    weight_milli_hours: i128,
    /// Sum of milli-hours x millionths of a percent.
    weighted_progress: i128,
    /// Sum of millionths of a percent, for all-zero-weight nodes.
    progress_sum: i128,
    critical: bool,
    early_start: Option<f64>,
    late_finish: Option<f64>,
}

impl Totals {
    fn add(&mut self, contribution: &WbsContribution<'_>) {
        // weight <= 1e12 and progress <= 1e8, so the product fits in i128
        let weight = i128::from(to_milli_hours(contribution.planned_duration_hours).max(0));
        let progress = (contribution.percent_complete.clamp(0.0, 100.0) * PERCENT_SCALE).round() as i128;
        self.count += 1;
        self.weight_milli_hours += weight;
        self.weighted_progress += weight * progress;
        self.progress_sum += progress;
        self.critical |= contribution.is_critical;
        self.early_start = Some(
            self.early_start
                .map_or(contribution.early_start_hours, |t| t.min(contribution.early_start_hours)),
        );
        self.late_finish = Some(
            self.late_finish
                .map_or(contribution.late_finish_hours, |t| t.max(contribution.late_finish_hours)),
        );
    }

    fn merge(&mut self, other: &Totals) {
        self.count += other.count;
        self.weight_milli_hours += other.weight_milli_hours;
        self.weighted_progress += other.weighted_progress;
        self.progress_sum += other.progress_sum;
        self.critical |= other.critical;
        self.early_start = match (self.early_start, other.early_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.late_finish = match (self.late_finish, other.late_finish) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    fn percent_complete(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else if self.weight_milli_hours == 0 {
            self.progress_sum as f64 / self.count as f64 / PERCENT_SCALE
        } else {
            self.weighted_progress as f64 / self.weight_milli_hours as f64 / PERCENT_SCALE
        }
    }
}

/// Roll activity contributions up the tree.
///
/// Contributions naming an unknown node are ignored. Output is in display
/// order.
pub fn aggregate_wbs<'c>(
    tree: &WbsTree<'_>,
    contributions: impl IntoIterator<Item = WbsContribution<'c>>,
) -> Vec<WbsRollup> {
    let mut totals = vec![Totals::default(); tree.len()];
    for contribution in contributions {
        if let Some(&pos) = tree.by_id.get(contribution.wbs_id) {
            totals[pos].add(&contribution);
        }
    }

    for &pos in &tree.bottom_up {
        if let Some(parent) = tree.parent[pos] {
            let child = totals[pos];
            totals[parent].merge(&child);
        }
    }

    tree.display_order()
        .into_iter()
        .map(|(pos, depth)| {
            let node = tree.nodes[pos];
            let total = &totals[pos];
            WbsRollup {
                wbs_id: node.id.clone(),
                code: node.code.clone(),
                name: node.name.clone(),
                parent_id: tree.parent[pos].map(|p| tree.nodes[p].id.clone()),
                sort_order: node.sort_order,
                depth,
                path: tree.path(&node.id),
                percent_complete: total.percent_complete(),
                is_critical: total.critical,
                activity_count: total.count,
                planned_duration_hours: total.weight_milli_hours as f64 / 1000.0,
                early_start_hours: total.early_start,
                late_finish_hours: total.late_finish,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(id: &str, parent: Option<&str>, sort_order: i64) -> WbsNode {
        WbsNode {
            id: id.to_string(),
            code: id.to_lowercase(),
            name: format!("Node {id}"),
            parent_id: parent.map(str::to_string),
            sort_order,
        }
    }

    fn contribution(wbs_id: &str, hours: f64, pct: f64, critical: bool) -> WbsContribution<'_> {
        WbsContribution {
            wbs_id,
            planned_duration_hours: hours,
            percent_complete: pct,
            is_critical: critical,
            early_start_hours: 0.0,
            late_finish_hours: hours,
        }
    }

    fn rollup<'r>(rollups: &'r [WbsRollup], id: &str) -> &'r WbsRollup {
        rollups.iter().find(|r| r.wbs_id == id).unwrap()
    }

    fn site_tree() -> Vec<WbsNode> {
        vec![
            make_node("ROOT", None, 0),
            make_node("CIVIL", Some("ROOT"), 1),
            make_node("MEP", Some("ROOT"), 2),
            make_node("EMPTY", Some("ROOT"), 3),
            make_node("FOUND", Some("CIVIL"), 1),
        ]
    }

    #[test]
    fn test_duration_weighted_rollup() {
        let nodes = site_tree();
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(
            &tree,
            vec![
                contribution("FOUND", 40.0, 100.0, false),
                contribution("CIVIL", 120.0, 20.0, true),
                contribution("MEP", 80.0, 50.0, false),
            ],
        );

        let found = rollup(&rollups, "FOUND");
        assert_eq!(found.percent_complete, 100.0);
        assert!(!found.is_critical);

        // (40*100 + 120*20) / 160 = 40
        let civil = rollup(&rollups, "CIVIL");
        assert_eq!(civil.percent_complete, 40.0);
        assert!(civil.is_critical);
        assert_eq!(civil.activity_count, 2);

        // (40*100 + 120*20 + 80*50) / 240
        let root = rollup(&rollups, "ROOT");
        assert!((root.percent_complete - 10400.0 / 240.0).abs() < 1e-9);
        assert!(root.is_critical);
        assert_eq!(root.planned_duration_hours, 240.0);
        assert_eq!(root.late_finish_hours, Some(120.0));
    }

    #[test]
    fn test_childless_node_reports_zero() {
        let nodes = site_tree();
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(&tree, vec![contribution("MEP", 8.0, 50.0, true)]);

        let empty = rollup(&rollups, "EMPTY");
        assert_eq!(empty.percent_complete, 0.0);
        assert!(!empty.is_critical);
        assert_eq!(empty.activity_count, 0);
        assert_eq!(empty.early_start_hours, None);
    }

    #[test]
    fn test_rollup_is_order_independent() {
        let nodes = site_tree();
        let tree = WbsTree::build(&nodes);
        let mut items = vec![
            contribution("FOUND", 13.3, 33.3, false),
            contribution("CIVIL", 7.7, 66.6, false),
            contribution("MEP", 0.1, 12.5, true),
            contribution("FOUND", 101.9, 99.9, false),
        ];
        let forward = aggregate_wbs(&tree, items.clone());
        items.reverse();
        let reversed = aggregate_wbs(&tree, items);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_zero_weight_uses_plain_mean() {
        let nodes = vec![make_node("M", None, 0)];
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(
            &tree,
            vec![contribution("M", 0.0, 100.0, false), contribution("M", 0.0, 0.0, false)],
        );
        assert_eq!(rollups[0].percent_complete, 50.0);
    }

    #[test]
    fn test_huge_planned_duration_saturates() {
        let nodes = vec![make_node("W", None, 0)];
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(
            &tree,
            vec![contribution("W", 1e36, 50.0, false), contribution("W", 1e36, 50.0, false)],
        );
        assert_eq!(rollups[0].percent_complete, 50.0);
        assert_eq!(rollups[0].planned_duration_hours, 2e9);
    }

    #[test]
    fn test_fine_grained_percent_is_kept() {
        let nodes = vec![make_node("W", None, 0)];
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(
            &tree,
            vec![contribution("W", 1.0, 12.345678, false), contribution("W", 3.0, 0.0, false)],
        );
        assert!((rollups[0].percent_complete - 12.345678 / 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_display_order_and_paths() {
        let nodes = site_tree();
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(&tree, Vec::new());

        let order: Vec<&str> = rollups.iter().map(|r| r.wbs_id.as_str()).collect();
        assert_eq!(order, vec!["ROOT", "CIVIL", "FOUND", "MEP", "EMPTY"]);
        assert_eq!(rollup(&rollups, "FOUND").path, vec!["root", "civil", "found"]);
        assert_eq!(rollup(&rollups, "FOUND").depth, 2);
        assert_eq!(tree.path("missing"), Vec::<String>::new());
    }

    #[test]
    fn test_validate_collects_every_issue() {
        let nodes = vec![
            make_node("A", Some("B"), 0),
            make_node("B", Some("A"), 0),
            make_node("C", Some("GHOST"), 0),
            make_node("C", None, 0),
        ];
        let issues = validate_wbs(&nodes);

        assert!(issues.contains(&ValidationIssue::DuplicateWbs { id: "C".into() }));
        assert!(issues.contains(&ValidationIssue::DanglingWbsParent {
            wbs_id: "C".into(),
            parent_id: "GHOST".into(),
        }));
        assert!(issues.iter().any(|i| matches!(i, ValidationIssue::WbsCycle { wbs_ids } if wbs_ids.len() == 3)));
    }

    #[test]
    fn test_build_tolerates_cycles() {
        let nodes = vec![make_node("A", Some("B"), 0), make_node("B", Some("A"), 1)];
        let tree = WbsTree::build(&nodes);
        let rollups = aggregate_wbs(&tree, vec![contribution("A", 8.0, 50.0, false)]);
        assert_eq!(rollups.len(), 2);
    }
}
