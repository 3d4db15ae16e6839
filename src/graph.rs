/// Bidirected scaffolding graph (spec.md §4.6): nodes are oriented scaffold ends,
/// arcs are mated pairs of directed entries between them. Built from the inter matrix,
/// pruned to convergence by an eight-step cascade, then walked into maximal paths.
///
/// Grounded on the teacher's `UnionFind` for component bookkeeping during path
/// extraction, generalized from alignment-graph pruning to the oriented-end model this
/// spec requires.
use crate::config::Config;
use crate::layout::Orientation;
use crate::link_matrix::{bucket_orientation, EndSide, InterEntry, ScaffoldPairKey};
use crate::norm::NormModel;
use crate::union_find::UnionFind;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

/// `scaffold_id << 1 | end_bit`; `end_bit = 0` is the 5' end, `1` is the 3' end.
pub fn end_node(scaffold_id: u32, side: EndSide) -> u32 {
    let bit = match side {
        EndSide::Five => 0,
        EndSide::Three => 1,
    };
    (scaffold_id << 1) | bit
}

pub fn node_scaffold(node: u32) -> u32 {
    node >> 1
}

pub fn node_side(node: u32) -> EndSide {
    if node & 1 == 0 {
        EndSide::Five
    } else {
        EndSide::Three
    }
}

/// One directed half of a mated arc pair. Two `Arc`s with the same `paired_id` (each
/// other's index) represent one logical undirected edge; removing one removes both
/// (spec.md §8 property 4).
#[derive(Debug, Clone)]
pub struct Arc {
    pub from: u32,
    pub to: u32,
    pub weight: f64,
    pub removed: bool,
    pub paired_id: usize,
}

#[derive(Debug, Default)]
pub struct ScaffoldGraph {
    pub n_nodes: u32,
    arcs: Vec<Arc>,
    /// node -> indices into `arcs` whose `from == node`.
    adjacency: HashMap<u32, Vec<usize>>,
}

impl ScaffoldGraph {
    pub fn new(n_scaffolds: u32) -> Self {
        ScaffoldGraph {
            n_nodes: n_scaffolds * 2,
            arcs: Vec::new(),
            adjacency: HashMap::new(),
        }
    }

    fn push_mated_pair(&mut self, a: u32, b: u32, weight: f64) {
        let idx_a = self.arcs.len();
        let idx_b = idx_a + 1;
        self.arcs.push(Arc {
            from: a,
            to: b,
            weight,
            removed: false,
            paired_id: idx_b,
        });
        self.arcs.push(Arc {
            from: b,
            to: a,
            weight,
            removed: false,
            paired_id: idx_a,
        });
        self.adjacency.entry(a).or_default().push(idx_a);
        self.adjacency.entry(b).or_default().push(idx_b);
    }

    fn remove_arc(&mut self, idx: usize) {
        let mate = self.arcs[idx].paired_id;
        self.arcs[idx].removed = true;
        self.arcs[mate].removed = true;
    }

    /// Active (non-removed) arcs out of `node`, highest weight first.
    fn live_out(&self, node: u32) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .adjacency
            .get(&node)
            .map(|v| v.iter().copied().filter(|&i| !self.arcs[i].removed).collect())
            .unwrap_or_default();
        out.sort_by_key(|&idx| std::cmp::Reverse(OrderedFloat(self.arcs[idx].weight)));
        out
    }

    fn live_arc_count(&self) -> usize {
        self.arcs.iter().filter(|a| !a.removed).count() / 2
    }

    /// Simple filter: at each node, drop out-arcs below `alpha * best` (spec.md §4.6).
    fn step_simple_filter(&mut self, config: &Config) -> bool {
        let mut changed = false;
        for node in 0..self.n_nodes {
            let live = self.live_out(node);
            let Some(&best_idx) = live.first() else { continue };
            let best = self.arcs[best_idx].weight;
            for &idx in &live[1..] {
                if self.arcs[idx].weight < config.alpha * best {
                    self.remove_arc(idx);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Tip trim: remove degree-1 nodes whose sole arc is weak relative to the
    /// neighbor's best arc (dangling short branches, spec.md §4.6).
    fn step_tip_trim(&mut self, config: &Config) -> bool {
        let mut changed = false;
        for node in 0..self.n_nodes {
            let live = self.live_out(node);
            if live.len() != 1 {
                continue;
            }
            let idx = live[0];
            let neighbor = self.arcs[idx].to;
            let neighbor_best = self.live_out(neighbor).first().map(|&i| self.arcs[i].weight).unwrap_or(0.0);
            if neighbor_best > 0.0 && self.arcs[idx].weight < config.alpha * neighbor_best {
                self.remove_arc(idx);
                changed = true;
            }
        }
        changed
    }

    /// Blunt trim: drop arcs whose weight sits at or below the weak-edge floor even
    /// after the simple filter has already run (spec.md §4.6).
    fn step_blunt_trim(&mut self, config: &Config) -> bool {
        let mut changed = false;
        for idx in 0..self.arcs.len() {
            if self.arcs[idx].removed {
                continue;
            }
            if self.arcs[idx].weight < config.delta {
                self.remove_arc(idx);
                changed = true;
            }
        }
        changed
    }

    /// Repeat trim: a node with more than two surviving out-arcs of comparable weight
    /// (within `beta` of each other) marks a repeat junction; keep only the single best
    /// (spec.md §4.6).
    fn step_repeat_trim(&mut self, config: &Config) -> bool {
        let mut changed = false;
        for node in 0..self.n_nodes {
            let live = self.live_out(node);
            if live.len() <= 2 {
                continue;
            }
            let best = self.arcs[live[0]].weight;
            for &idx in &live[1..] {
                if self.arcs[idx].weight >= config.beta * best {
                    self.remove_arc(idx);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Transitive reduction: if `a -> b`, `b -> c`, and `a -> c` exist with the direct
    /// arc no stronger than the two-hop path times a slack factor `tau`, drop the
    /// direct arc as redundant (spec.md §4.6).
    fn step_transitive_reduction(&mut self, config: &Config) -> bool {
        let mut changed = false;
        let nodes: Vec<u32> = (0..self.n_nodes).collect();
        for &a in &nodes {
            let out_a = self.live_out(a);
            for &ab_idx in &out_a {
                let b = self.arcs[ab_idx].to;
                if b == a {
                    continue;
                }
                let out_b = self.live_out(b);
                for &bc_idx in &out_b {
                    let c = self.arcs[bc_idx].to;
                    if c == a || c == b {
                        continue;
                    }
                    if let Some(&ac_idx) = out_a.iter().find(|&&i| self.arcs[i].to == c) {
                        let two_hop = self.arcs[ab_idx].weight.min(self.arcs[bc_idx].weight);
                        if self.arcs[ac_idx].weight <= two_hop * config.tau && !self.arcs[ac_idx].removed {
                            self.remove_arc(ac_idx);
                            changed = true;
                        }
                    }
                }
            }
        }
        changed
    }

    /// Bubble popping: two parallel paths of length 2 between the same endpoints (a
    /// shared neighbor fork that rejoins) collapse to the stronger one (spec.md §4.6).
    fn step_bubble_pop(&mut self) -> bool {
        let mut changed = false;
        for node in 0..self.n_nodes {
            let live = self.live_out(node);
            if live.len() < 2 {
                continue;
            }
            // Group out-neighbors by their own best onward target (a crude bubble
            // signature: two branches from `node` that both lead onward to the same
            // far node are a bubble).
            let mut by_far: HashMap<u32, Vec<usize>> = HashMap::new();
            for &idx in &live {
                let mid = self.arcs[idx].to;
                if let Some(&far_idx) = self.live_out(mid).first() {
                    by_far.entry(self.arcs[far_idx].to).or_default().push(idx);
                }
            }
            for (_far, branch) in by_far {
                if branch.len() < 2 {
                    continue;
                }
                let best = branch
                    .iter()
                    .copied()
                    .max_by_key(|&idx| OrderedFloat(self.arcs[idx].weight))
                    .unwrap();
                for idx in branch {
                    if idx != best && !self.arcs[idx].removed {
                        self.remove_arc(idx);
                        changed = true;
                    }
                }
            }
        }
        changed
    }

    /// Weak-edge trim: drop any surviving arc under the absolute floor `delta`
    /// (spec.md §4.6). Distinct from blunt trim in that it runs after topological
    /// simplification has possibly changed relative weights downstream.
    fn step_weak_edge_trim(&mut self, config: &Config) -> bool {
        self.step_blunt_trim(config)
    }

    /// Self-loop trim: an arc from a node back to its own scaffold's other end is never
    /// a valid join and is always dropped (spec.md §4.6).
    fn step_self_loop_trim(&mut self) -> bool {
        let mut changed = false;
        for idx in 0..self.arcs.len() {
            if self.arcs[idx].removed {
                continue;
            }
            if node_scaffold(self.arcs[idx].from) == node_scaffold(self.arcs[idx].to) {
                self.remove_arc(idx);
                changed = true;
            }
        }
        changed
    }

    /// Run the eight-step pruning cascade to a fixed point (spec.md §4.6).
    pub fn prune_to_convergence(&mut self, config: &Config) {
        loop {
            let mut changed = false;
            changed |= self.step_simple_filter(config);
            changed |= self.step_tip_trim(config);
            changed |= self.step_blunt_trim(config);
            changed |= self.step_repeat_trim(config);
            changed |= self.step_transitive_reduction(config);
            changed |= self.step_bubble_pop();
            changed |= self.step_weak_edge_trim(config);
            changed |= self.step_self_loop_trim();
            if !changed {
                break;
            }
        }
    }

    /// Ambiguous-edge trim: a node whose best two surviving out-arcs are within `beta`
    /// of each other cannot be resolved and both are dropped (spec.md §4.6, run once
    /// after the cascade has converged).
    pub fn trim_ambiguous(&mut self, config: &Config) {
        for node in 0..self.n_nodes {
            let live = self.live_out(node);
            if live.len() < 2 {
                continue;
            }
            let best = self.arcs[live[0]].weight;
            let second = self.arcs[live[1]].weight;
            if best > 0.0 && second >= config.beta * best {
                self.remove_arc(live[0]);
                self.remove_arc(live[1]);
            }
        }
    }

    pub fn live_arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.iter().filter(|a| !a.removed)
    }

    /// Extract maximal simple paths through the pruned graph (spec.md §4.6, §8 property
    /// 5: every scaffold appears in exactly one emitted path). Each path is a sequence
    /// of `(scaffold_id, orientation)` in traversal order. Cycles are broken at their
    /// weakest surviving arc before walking.
    pub fn extract_paths(&mut self, n_scaffolds: u32) -> Vec<Vec<(u32, Orientation)>> {
        self.break_cycles(n_scaffolds);

        let mut visited_scaffold = vec![false; n_scaffolds as usize];
        let mut paths = Vec::new();

        // Start from scaffolds whose both ends have degree <= 1 out-degree-wise, i.e.
        // path endpoints; anything left over after that sweep is a (now acyclic) closed
        // chain and is walked starting from an arbitrary member.
        for s in 0..n_scaffolds {
            if visited_scaffold[s as usize] {
                continue;
            }
            let five_deg = self.live_out(end_node(s, EndSide::Five)).len();
            let three_deg = self.live_out(end_node(s, EndSide::Three)).len();
            if five_deg <= 1 && three_deg <= 1 && (five_deg + three_deg) <= 1 {
                let path = self.walk_path(s, &mut visited_scaffold);
                paths.push(path);
            }
        }
        for s in 0..n_scaffolds {
            if !visited_scaffold[s as usize] {
                let path = self.walk_path(s, &mut visited_scaffold);
                paths.push(path);
            }
        }
        paths
    }

    fn walk_path(&self, start: u32, visited: &mut [bool]) -> Vec<(u32, Orientation)> {
        let mut path = vec![(start, Orientation::Forward)];
        visited[start as usize] = true;

        // Walk forward from the 3' end of `start` until no unvisited continuation
        // remains.
        let mut current_exit = end_node(start, EndSide::Three);
        loop {
            let Some(&idx) = self
                .live_out(current_exit)
                .iter()
                .find(|&&i| !visited[node_scaffold(self.arcs[i].to) as usize])
            else {
                break;
            };
            let arc = &self.arcs[idx];
            let next_scaffold = node_scaffold(arc.to);
            let entry_side = node_side(arc.to);
            // Arriving at the 5' end means forward orientation continues the path;
            // arriving at the 3' end means the scaffold must be flipped.
            let orientation = match entry_side {
                EndSide::Five => Orientation::Forward,
                EndSide::Three => Orientation::Reverse,
            };
            path.push((next_scaffold, orientation));
            visited[next_scaffold as usize] = true;
            current_exit = match orientation {
                Orientation::Forward => end_node(next_scaffold, EndSide::Three),
                Orientation::Reverse => end_node(next_scaffold, EndSide::Five),
            };
        }
        path
    }

    /// Break any remaining cycle (every node still has both ends with degree 1,
    /// connected in a ring) by dropping the globally weakest arc on each such ring.
    fn break_cycles(&mut self, n_scaffolds: u32) {
        let mut uf = UnionFind::new(n_scaffolds as usize);
        for arc in self.live_arcs() {
            uf.union(node_scaffold(arc.from) as usize, node_scaffold(arc.to) as usize);
        }
        let mut by_root: HashMap<usize, Vec<u32>> = HashMap::new();
        for s in 0..n_scaffolds {
            let root = uf.find(s as usize);
            by_root.entry(root).or_default().push(s);
        }

        for (_root, members) in by_root {
            let is_ring = members.iter().all(|&s| {
                self.live_out(end_node(s, EndSide::Five)).len() == 1
                    && self.live_out(end_node(s, EndSide::Three)).len() == 1
            });
            if !is_ring || members.len() < 2 {
                continue;
            }
            let mut weakest: Option<usize> = None;
            for &s in &members {
                for &idx in &self.live_out(end_node(s, EndSide::Three)) {
                    if weakest.map(|w| self.arcs[idx].weight < self.arcs[w].weight).unwrap_or(true) {
                        weakest = Some(idx);
                    }
                }
            }
            if let Some(idx) = weakest {
                self.remove_arc(idx);
            }
        }
    }
}

/// Build the graph from the fitted inter matrix, creating an arc for every bucket
/// whose normalized score clears both the static floor `theta_min` and the data-driven
/// quality-limited threshold `norm.qla` (spec.md §4.6).
pub fn build_graph(
    n_scaffolds: u32,
    inter: &HashMap<ScaffoldPairKey, InterEntry>,
    norm: &NormModel,
    config: &Config,
) -> ScaffoldGraph {
    let mut graph = ScaffoldGraph::new(n_scaffolds);
    for (key, entry) in inter {
        for (bucket_idx, bucket) in entry.buckets.iter().enumerate() {
            if bucket.normalized < config.theta_min || bucket.normalized < norm.qla {
                continue;
            }
            let (end_lo, end_hi) = bucket_orientation(bucket_idx);
            let a = end_node(key.lo, end_lo);
            let b = end_node(key.hi, end_hi);
            graph.push_mated_pair(a, b, bucket.normalized);
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_node_round_trip() {
        let n = end_node(5, EndSide::Three);
        assert_eq!(node_scaffold(n), 5);
        assert_eq!(node_side(n), EndSide::Three);
    }

    #[test]
    fn test_mated_pair_removal_is_symmetric() {
        let mut graph = ScaffoldGraph::new(2);
        graph.push_mated_pair(end_node(0, EndSide::Three), end_node(1, EndSide::Five), 5.0);
        assert_eq!(graph.live_arcs().count(), 2);
        graph.remove_arc(0);
        assert_eq!(graph.live_arcs().count(), 0);
    }

    #[test]
    fn test_self_loop_trimmed() {
        let mut graph = ScaffoldGraph::new(1);
        graph.push_mated_pair(end_node(0, EndSide::Five), end_node(0, EndSide::Three), 5.0);
        graph.step_self_loop_trim();
        assert_eq!(graph.live_arcs().count(), 0);
    }

    #[test]
    fn test_two_scaffold_join_survives_and_extracts_one_path() {
        let mut graph = ScaffoldGraph::new(2);
        graph.push_mated_pair(end_node(0, EndSide::Three), end_node(1, EndSide::Five), 5.0);
        let config = Config::default();
        graph.prune_to_convergence(&config);
        assert_eq!(graph.live_arcs().count(), 2);
        let paths = graph.extract_paths(2);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 2);
    }
}
