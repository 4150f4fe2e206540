//! Process graph store
//!
//! Nodes and edges live in flat id-keyed maps; a petgraph stable graph is
//! kept alongside as the adjacency index. Cycles and self-loops are
//! accepted: finding them is the analyzer's job, not the store's.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use thiserror::Error;

use super::edge::Edge;
use super::id::{EdgeId, NodeId};
use super::node::Node;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge already exists: {0}")]
    DuplicateEdge(EdgeId),
}

/// The narrow interface the engine reads and writes the graph through
///
/// Node status can only be changed by this crate, so handing out
/// `&mut Node` does not let a store bypass the transition core.
pub trait GraphStore {
    fn node(&self, id: &NodeId) -> Option<&Node>;

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node>;

    /// All nodes in a stable order
    fn all_nodes(&self) -> Vec<&Node>;

    /// All edges matching `predicate`, in a stable order
    fn edges_where<P>(&self, predicate: P) -> Vec<&Edge>
    where
        P: Fn(&Edge) -> bool;

    fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    fn node_count(&self) -> usize {
        self.all_nodes().len()
    }

    fn edge_count(&self) -> usize {
        self.edges_where(|_| true).len()
    }

    fn outgoing(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges_where(|edge| &edge.from == id)
    }

    fn incoming(&self, id: &NodeId) -> Vec<&Edge> {
        self.edges_where(|edge| &edge.to == id)
    }

    /// Direct successors, deduplicated, in edge order
    fn successors(&self, id: &NodeId) -> Vec<NodeId> {
        dedup(self.outgoing(id).into_iter().map(|edge| edge.to.clone()))
    }

    /// Direct predecessors, deduplicated, in edge order
    fn predecessors(&self, id: &NodeId) -> Vec<NodeId> {
        dedup(self.incoming(id).into_iter().map(|edge| edge.from.clone()))
    }
}

fn dedup(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// In-memory process graph
#[derive(Debug, Default, Clone)]
pub struct ProcessGraph {
    /// Adjacency index: node weights are node IDs, edge weights are edge IDs
    graph: StableDiGraph<NodeId, EdgeId>,

    /// Map from NodeId to node index
    node_map: HashMap<NodeId, NodeIndex>,

    nodes: HashMap<NodeId, Node>,

    edges: HashMap<EdgeId, (Edge, EdgeIndex)>,
}

impl ProcessGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from node and edge collections
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();

        // First pass: add all nodes
        for node in nodes {
            graph.add_node(node)?;
        }

        // Second pass: add all edges
        for edge in edges {
            graph.add_edge(edge)?;
        }

        Ok(graph)
    }

    /// Adds a node to the graph
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.node_map.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }

        let idx = self.graph.add_node(node.id.clone());
        self.node_map.insert(node.id.clone(), idx);
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Removes a node together with every edge touching it
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.node_map.remove(id)?;

        let incident: Vec<EdgeId> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|edge| edge.weight().clone())
            .collect();
        for edge_id in incident {
            self.edges.remove(&edge_id);
        }

        // StableGraph drops incident edges and keeps other indices valid
        self.graph.remove_node(idx);
        self.nodes.remove(id)
    }

    /// Adds a dependency edge; both endpoints must already exist
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdge(edge.id));
        }

        let from_idx = *self
            .node_map
            .get(&edge.from)
            .ok_or_else(|| GraphError::NodeNotFound(edge.from.clone()))?;

        let to_idx = *self
            .node_map
            .get(&edge.to)
            .ok_or_else(|| GraphError::NodeNotFound(edge.to.clone()))?;

        let edge_idx = self.graph.add_edge(from_idx, to_idx, edge.id.clone());
        self.edges.insert(edge.id.clone(), (edge, edge_idx));
        Ok(())
    }

    /// Removes an edge by ID
    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        let (edge, idx) = self.edges.remove(id)?;
        self.graph.remove_edge(idx);
        Some(edge)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id).map(|(edge, _)| edge)
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Returns the number of nodes in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Edges touching `idx` in one direction, in insertion order
    fn directed_edges(&self, id: &NodeId, direction: Direction) -> Vec<&Edge> {
        let idx = match self.node_map.get(id) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut refs: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        refs.sort_by_key(|edge| edge.id());

        refs.into_iter()
            .filter_map(|edge| self.edges.get(edge.weight()).map(|(e, _)| e))
            .collect()
    }
}

impl GraphStore for ProcessGraph {
    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    fn all_nodes(&self) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    fn edges_where<P>(&self, predicate: P) -> Vec<&Edge>
    where
        P: Fn(&Edge) -> bool,
    {
        self.graph
            .edge_indices()
            .filter_map(|idx| self.graph.edge_weight(idx))
            .filter_map(|id| self.edges.get(id).map(|(edge, _)| edge))
            .filter(|edge| predicate(edge))
            .collect()
    }

    fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn outgoing(&self, id: &NodeId) -> Vec<&Edge> {
        self.directed_edges(id, Direction::Outgoing)
    }

    fn incoming(&self, id: &NodeId) -> Vec<&Edge> {
        self.directed_edges(id, Direction::Incoming)
    }
}
