//! Cycle, path and bottleneck analysis
//!
//! Traversals run on explicit frame stacks with visited / on-path sets, so
//! neither deep chains nor user-created cycles can exhaust the call stack.
//! Nothing here mutates the graph.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::domain::{GraphStore, NodeId};

/// A node qualifies as a bottleneck at this in- or out-degree
pub const BOTTLENECK_DEGREE: usize = 3;

/// A bottleneck is high risk at this in- or out-degree
pub const HIGH_RISK_DEGREE: usize = 5;

/// One node on a depth-first stack plus the successors it has yet to try
struct Frame {
    id: NodeId,
    successors: Vec<NodeId>,
    next: usize,
}

impl Frame {
    fn new<G: GraphStore>(graph: &G, id: NodeId) -> Self {
        let successors = graph.successors(&id);
        Self {
            id,
            successors,
            next: 0,
        }
    }

    fn advance(&mut self) -> Option<NodeId> {
        let next = self.successors.get(self.next).cloned();
        self.next += 1;
        next
    }
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// Finds cycles with a depth-first search over all nodes.
///
/// Each back-edge (an edge into a node still on the search stack) yields
/// one cycle: the slice of the current path from that node to the node
/// holding the edge. Self-loops come out as one-element cycles.
pub fn detect_cycles<G: GraphStore>(graph: &G) -> Vec<Vec<NodeId>> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut on_stack: HashSet<NodeId> = HashSet::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut cycles: Vec<Vec<NodeId>> = Vec::new();

    for root in graph.all_nodes() {
        if visited.contains(&root.id) {
            continue;
        }
        visited.insert(root.id.clone());
        on_stack.insert(root.id.clone());
        frames.push(Frame::new(graph, root.id.clone()));

        while let Some(frame) = frames.last_mut() {
            let Some(next) = frame.advance() else {
                if let Some(done) = frames.pop() {
                    on_stack.remove(&done.id);
                }
                continue;
            };

            if on_stack.contains(&next) {
                if let Some(start) = frames.iter().position(|f| f.id == next) {
                    cycles.push(frames[start..].iter().map(|f| f.id.clone()).collect());
                }
            } else if !visited.contains(&next) {
                visited.insert(next.clone());
                on_stack.insert(next.clone());
                frames.push(Frame::new(graph, next));
            }
        }
    }

    cycles
}

/// True if `to` can be reached from `from` along one or more edges
pub fn reaches<G: GraphStore>(graph: &G, from: &NodeId, to: &NodeId) -> bool {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut pending = graph.successors(from);

    while let Some(next) = pending.pop() {
        if &next == to {
            return true;
        }
        if seen.insert(next.clone()) {
            pending.extend(graph.successors(&next));
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// The longest chain of dependent nodes starting at a node with no predecessors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPath {
    pub start_node: Option<NodeId>,
    pub length: usize,
    pub nodes: Vec<NodeId>,
}

/// Longest simple chain of node IDs reachable from `start`.
///
/// A node already on the current path is never revisited; on ties the
/// first chain discovered wins. Returns an empty chain for unknown nodes.
pub fn longest_path<G: GraphStore>(graph: &G, start: &NodeId) -> Vec<NodeId> {
    if !graph.contains(start) {
        return Vec::new();
    }
    LongestChains::new(graph).chain_from(start)
}

/// Longest-chain search shared across start nodes.
///
/// On an acyclic graph every node's best chain is independent of how it was
/// reached, so it is computed once and cached as (length, next hop). With
/// cycles present the search falls back to enumerating simple paths.
struct LongestChains<'a, G: GraphStore> {
    graph: &'a G,
    acyclic: bool,
    memo: HashMap<NodeId, (usize, Option<NodeId>)>,
}

impl<'a, G: GraphStore> LongestChains<'a, G> {
    fn new(graph: &'a G) -> Self {
        Self {
            graph,
            acyclic: detect_cycles(graph).is_empty(),
            memo: HashMap::new(),
        }
    }

    fn chain_from(&mut self, start: &NodeId) -> Vec<NodeId> {
        if self.acyclic {
            self.memoized(start)
        } else {
            self.simple_paths(start)
        }
    }

    fn memoized(&mut self, start: &NodeId) -> Vec<NodeId> {
        if !self.memo.contains_key(start) {
            self.fill_memo(start);
        }

        let mut chain = Vec::new();
        let mut cursor = Some(start.clone());
        while let Some(id) = cursor {
            cursor = self.memo.get(&id).and_then(|(_, next)| next.clone());
            chain.push(id);
        }
        chain
    }

    /// Post-order walk recording each node's best (length, next hop).
    /// The first successor with a strictly longer chain is kept.
    fn fill_memo(&mut self, start: &NodeId) {
        let graph = self.graph;
        // (frame, best length below it, successor that gave it)
        let mut stack: Vec<(Frame, usize, Option<NodeId>)> =
            vec![(Frame::new(graph, start.clone()), 0, None)];

        while let Some((frame, best_len, best_next)) = stack.last_mut() {
            let Some(next) = frame.advance() else {
                if let Some((done, len, next)) = stack.pop() {
                    let total = len + 1;
                    if let Some((_, parent_len, parent_next)) = stack.last_mut() {
                        if total > *parent_len {
                            *parent_len = total;
                            *parent_next = Some(done.id.clone());
                        }
                    }
                    self.memo.insert(done.id, (total, next));
                }
                continue;
            };

            match self.memo.get(&next) {
                Some((len, _)) => {
                    if *len > *best_len {
                        *best_len = *len;
                        *best_next = Some(next);
                    }
                }
                None => stack.push((Frame::new(graph, next), 0, None)),
            }
        }
    }

    /// Depth-first enumeration of simple paths, for graphs with cycles
    fn simple_paths(&self, start: &NodeId) -> Vec<NodeId> {
        let graph = self.graph;
        let mut on_path: HashSet<NodeId> = HashSet::from([start.clone()]);
        // (frame, best chain below it)
        let mut stack: Vec<(Frame, Vec<NodeId>)> =
            vec![(Frame::new(graph, start.clone()), Vec::new())];

        while let Some((frame, _)) = stack.last_mut() {
            let Some(next) = frame.advance() else {
                let Some((done, best)) = stack.pop() else {
                    break;
                };
                on_path.remove(&done.id);

                let mut chain = Vec::with_capacity(best.len() + 1);
                chain.push(done.id);
                chain.extend(best);

                match stack.last_mut() {
                    Some((_, parent_best)) => {
                        if chain.len() > parent_best.len() {
                            *parent_best = chain;
                        }
                    }
                    None => return chain,
                }
                continue;
            };

            if on_path.insert(next.clone()) {
                stack.push((Frame::new(graph, next), Vec::new()));
            }
        }

        Vec::new()
    }
}

/// Nodes with zero direct predecessors, in graph order
pub fn start_nodes<G: GraphStore>(graph: &G) -> Vec<NodeId> {
    graph
        .all_nodes()
        .into_iter()
        .filter(|node| graph.incoming(&node.id).is_empty())
        .map(|node| node.id.clone())
        .collect()
}

/// Longest `longest_path` over all start nodes; first discovered on ties
pub fn critical_path<G: GraphStore>(graph: &G) -> CriticalPath {
    let mut chains = LongestChains::new(graph);
    let mut best = CriticalPath::default();

    for start in start_nodes(graph) {
        let nodes = chains.chain_from(&start);
        if nodes.len() > best.length {
            best = CriticalPath {
                start_node: Some(start),
                length: nodes.len(),
                nodes,
            };
        }
    }

    best
}

// ---------------------------------------------------------------------------
// Degrees and bottlenecks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    /// Many edges flow in
    Convergence,
    /// Many edges flow out
    Divergence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub node_id: NodeId,
    pub name: String,
    pub in_degree: usize,
    pub out_degree: usize,
    #[serde(rename = "type")]
    pub kind: BottleneckKind,
    pub risk: Risk,
}

impl Bottleneck {
    pub fn max_degree(&self) -> usize {
        self.in_degree.max(self.out_degree)
    }
}

/// Direct-edge degree statistics over the whole graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegreeMetrics {
    pub avg_in_degree: f64,
    pub avg_out_degree: f64,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
    pub isolated_node_count: usize,
}

/// Nodes with high in- or out-degree, most connected first
pub fn bottlenecks<G: GraphStore>(graph: &G) -> Vec<Bottleneck> {
    let mut found: Vec<Bottleneck> = graph
        .all_nodes()
        .into_iter()
        .filter_map(|node| {
            let in_degree = graph.incoming(&node.id).len();
            let out_degree = graph.outgoing(&node.id).len();

            if in_degree < BOTTLENECK_DEGREE && out_degree < BOTTLENECK_DEGREE {
                return None;
            }

            let kind = if in_degree >= out_degree {
                BottleneckKind::Convergence
            } else {
                BottleneckKind::Divergence
            };
            let risk = if in_degree.max(out_degree) >= HIGH_RISK_DEGREE {
                Risk::High
            } else {
                Risk::Medium
            };

            Some(Bottleneck {
                node_id: node.id.clone(),
                name: node.name.clone(),
                in_degree,
                out_degree,
                kind,
                risk,
            })
        })
        .collect();

    // Stable sort keeps graph order among equal degrees
    found.sort_by(|a, b| b.max_degree().cmp(&a.max_degree()));
    found
}

pub fn degree_metrics<G: GraphStore>(graph: &G) -> DegreeMetrics {
    let nodes = graph.all_nodes();
    if nodes.is_empty() {
        return DegreeMetrics::default();
    }

    let mut metrics = DegreeMetrics::default();
    let mut total_in = 0usize;
    let mut total_out = 0usize;

    for node in &nodes {
        let in_degree = graph.incoming(&node.id).len();
        let out_degree = graph.outgoing(&node.id).len();

        total_in += in_degree;
        total_out += out_degree;
        metrics.max_in_degree = metrics.max_in_degree.max(in_degree);
        metrics.max_out_degree = metrics.max_out_degree.max(out_degree);
        if in_degree == 0 && out_degree == 0 {
            metrics.isolated_node_count += 1;
        }
    }

    let count = nodes.len() as f64;
    metrics.avg_in_degree = total_in as f64 / count;
    metrics.avg_out_degree = total_out as f64 / count;
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Edge, EdgeId, Node, ProcessGraph};

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| id(n)).collect()
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> ProcessGraph {
        let nodes = nodes.iter().map(|n| Node::new(id(n), n.to_uppercase()));
        let edges = edges.iter().enumerate().map(|(i, (f, t))| {
            Edge::with_id(EdgeId::new(format!("e{}", i)).unwrap(), id(f), id(t))
        });
        ProcessGraph::from_parts(nodes, edges).unwrap()
    }

    #[test]
    fn three_node_cycle_is_found_once() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let cycles = detect_cycles(&g);

        assert_eq!(cycles.len(), 1);
        let members: HashSet<_> = cycles[0].iter().cloned().collect();
        assert_eq!(members, ids(&["a", "b", "c"]).into_iter().collect());
        assert_eq!(cycles[0], ids(&["a", "b", "c"]));
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert!(detect_cycles(&g).is_empty());
    }

    #[test]
    fn self_loop_is_a_single_node_cycle() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "b")]);
        assert_eq!(detect_cycles(&g), vec![ids(&["b"])]);
    }

    #[test]
    fn cycle_slice_starts_at_reentered_node() {
        // a -> b -> c -> d -> b
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("d", "b")],
        );
        assert_eq!(detect_cycles(&g), vec![ids(&["b", "c", "d"])]);
    }

    #[test]
    fn reachability_follows_edge_direction() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("d", "d")]);

        assert!(reaches(&g, &id("a"), &id("c")));
        assert!(!reaches(&g, &id("c"), &id("a")));
        assert!(!reaches(&g, &id("a"), &id("a")));
        assert!(reaches(&g, &id("d"), &id("d")));
    }

    #[test]
    fn longest_path_on_chain() {
        let names = ["n1", "n2", "n3", "n4", "n5"];
        let edges: Vec<_> = names.windows(2).map(|w| (w[0], w[1])).collect();
        let g = graph(&names, &edges);

        assert_eq!(longest_path(&g, &id("n1")), ids(&names));
        assert_eq!(longest_path(&g, &id("n4")), ids(&["n4", "n5"]));
    }

    #[test]
    fn longest_path_prefers_longer_branch() {
        // a -> b -> e, a -> c -> d -> e
        let g = graph(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "e"), ("a", "c"), ("c", "d"), ("d", "e")],
        );
        assert_eq!(longest_path(&g, &id("a")), ids(&["a", "c", "d", "e"]));
    }

    #[test]
    fn longest_path_ties_keep_first_discovered() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("a", "c")]);
        assert_eq!(longest_path(&g, &id("a")), ids(&["a", "b"]));
    }

    #[test]
    fn longest_path_terminates_on_cycles() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(longest_path(&g, &id("a")), ids(&["a", "b", "c"]));
    }

    #[test]
    fn longest_path_unknown_start_is_empty() {
        let g = graph(&["a"], &[]);
        assert!(longest_path(&g, &id("ghost")).is_empty());
    }

    fn chain_of(len: usize) -> ProcessGraph {
        let nodes = (0..len).map(|i| Node::new(id(&format!("n{}", i)), format!("N{}", i)));
        let edges = (1..len).map(|i| {
            Edge::with_id(
                EdgeId::new(format!("e{}", i)).unwrap(),
                id(&format!("n{}", i - 1)),
                id(&format!("n{}", i)),
            )
        });
        ProcessGraph::from_parts(nodes, edges).unwrap()
    }

    /// s0 -> {a0, b0} -> s1 -> {a1, b1} -> ... -> s{rungs}
    fn ladder(rungs: usize) -> ProcessGraph {
        let mut names = vec![format!("s{}", 0)];
        let mut edges = Vec::new();
        for i in 0..rungs {
            let (s, a, b, next) = (
                format!("s{}", i),
                format!("a{}", i),
                format!("b{}", i),
                format!("s{}", i + 1),
            );
            edges.push((s.clone(), a.clone()));
            edges.push((s, b.clone()));
            edges.push((a.clone(), next.clone()));
            edges.push((b.clone(), next.clone()));
            names.extend([a, b, next]);
        }

        let nodes = names.iter().map(|n| Node::new(id(n), n.to_uppercase()));
        let edges = edges.iter().enumerate().map(|(i, (f, t))| {
            Edge::with_id(EdgeId::new(format!("e{}", i)).unwrap(), id(f), id(t))
        });
        ProcessGraph::from_parts(nodes, edges).unwrap()
    }

    #[test]
    fn deep_chain_does_not_exhaust_the_stack() {
        let g = chain_of(10_000);

        assert!(detect_cycles(&g).is_empty());
        let path = critical_path(&g);
        assert_eq!(path.start_node, Some(id("n0")));
        assert_eq!(path.length, 10_000);
        assert_eq!(path.nodes.last(), Some(&id("n9999")));
    }

    #[test]
    fn deep_cycle_is_found_without_recursion() {
        let mut g = chain_of(10_000);
        g.add_edge(Edge::with_id(EdgeId::new("back").unwrap(), id("n9999"), id("n0")))
            .unwrap();

        let cycles = detect_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 10_000);
        assert_eq!(longest_path(&g, &id("n0")).len(), 10_000);
    }

    #[test]
    fn diamond_ladder_critical_path_is_fast() {
        let rungs = 30;
        let g = ladder(rungs);

        let started = std::time::Instant::now();
        let path = critical_path(&g);
        let elapsed = started.elapsed();

        assert_eq!(path.length, 2 * rungs + 1);
        assert_eq!(path.nodes[..3], ids(&["s0", "a0", "s1"])[..]);
        assert!(
            elapsed < std::time::Duration::from_secs(2),
            "critical path took {:?}",
            elapsed
        );
    }

    #[test]
    fn cached_and_enumerated_searches_agree_on_ties() {
        // a -> {b, c} -> d, plus a disconnected cycle x <-> y
        let dag = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let mixed = graph(
            &["a", "b", "c", "d", "x", "y"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("x", "y"), ("y", "x")],
        );

        assert_eq!(longest_path(&dag, &id("a")), ids(&["a", "b", "d"]));
        assert_eq!(longest_path(&mixed, &id("a")), ids(&["a", "b", "d"]));
    }

    #[test]
    fn critical_path_picks_longest_start() {
        // s1 -> x ; s2 -> y -> z
        let g = graph(&["s1", "x", "s2", "y", "z"], &[("s1", "x"), ("s2", "y"), ("y", "z")]);
        let path = critical_path(&g);

        assert_eq!(path.start_node, Some(id("s2")));
        assert_eq!(path.length, 3);
        assert_eq!(path.nodes, ids(&["s2", "y", "z"]));
    }

    #[test]
    fn critical_path_empty_when_everything_is_cyclic() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let path = critical_path(&g);
        assert_eq!(path, CriticalPath::default());
    }

    #[test]
    fn convergence_bottleneck_with_medium_risk() {
        let g = graph(
            &["p1", "p2", "p3", "p4", "x", "out"],
            &[("p1", "x"), ("p2", "x"), ("p3", "x"), ("p4", "x"), ("x", "out")],
        );
        let found = bottlenecks(&g);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node_id, id("x"));
        assert_eq!(found[0].in_degree, 4);
        assert_eq!(found[0].out_degree, 1);
        assert_eq!(found[0].kind, BottleneckKind::Convergence);
        assert_eq!(found[0].risk, Risk::Medium);
    }

    #[test]
    fn divergence_bottleneck_with_high_risk_sorted_first() {
        let g = graph(
            &["hub", "a", "b", "c", "d", "e", "sink", "i1", "i2"],
            &[
                ("i1", "sink"),
                ("i2", "sink"),
                ("a", "sink"),
                ("hub", "a"),
                ("hub", "b"),
                ("hub", "c"),
                ("hub", "d"),
                ("hub", "e"),
            ],
        );
        let found = bottlenecks(&g);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].node_id, id("hub"));
        assert_eq!(found[0].kind, BottleneckKind::Divergence);
        assert_eq!(found[0].risk, Risk::High);
        assert_eq!(found[1].node_id, id("sink"));
        assert_eq!(found[1].kind, BottleneckKind::Convergence);
    }

    #[test]
    fn equal_degrees_classify_as_convergence() {
        let g = graph(
            &["x", "a", "b", "c", "d", "e", "f"],
            &[
                ("a", "x"),
                ("b", "x"),
                ("c", "x"),
                ("x", "d"),
                ("x", "e"),
                ("x", "f"),
            ],
        );
        assert_eq!(bottlenecks(&g)[0].kind, BottleneckKind::Convergence);
    }

    #[test]
    fn degree_metrics_counts() {
        let g = graph(&["a", "b", "c", "lonely"], &[("a", "b"), ("a", "c")]);
        let m = degree_metrics(&g);

        assert_eq!(m.max_out_degree, 2);
        assert_eq!(m.max_in_degree, 1);
        assert_eq!(m.isolated_node_count, 1);
        assert!((m.avg_in_degree - 0.5).abs() < f64::EPSILON);
        assert!((m.avg_out_degree - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn degree_metrics_empty_graph() {
        let g = ProcessGraph::new();
        assert_eq!(degree_metrics(&g), DegreeMetrics::default());
    }
}
