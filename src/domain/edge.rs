//! Edge domain model
//!
//! Edges are directed dependencies: `from` must be fulfilled before `to`
//! can become active.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::id::{EdgeId, NodeId};

/// Type of dependency between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// `to` follows `from` in sequence
    #[default]
    Sequential,
    /// `to` runs alongside other branches fanning out of `from`
    Parallel,
    /// `to` only runs on some outcome of `from`
    Conditional,
}

/// How tightly the two ends of an edge are coupled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    #[default]
    Medium,
    Strong,
}

fn default_required() -> bool {
    true
}

/// A directed dependency between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,

    pub from: NodeId,

    pub to: NodeId,

    #[serde(rename = "type", default)]
    pub dependency_type: DependencyType,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default)]
    pub strength: Strength,
}

impl Edge {
    /// Creates a required, medium-strength sequential edge with a generated ID
    pub fn new(from: NodeId, to: NodeId) -> Self {
        let id = EdgeId::generate(&from, &to, Utc::now());
        Self::with_id(id, from, to)
    }

    /// Creates a required, medium-strength sequential edge with the given ID
    pub fn with_id(id: EdgeId, from: NodeId, to: NodeId) -> Self {
        Self {
            id,
            from,
            to,
            dependency_type: DependencyType::default(),
            required: true,
            strength: Strength::default(),
        }
    }

    pub fn of_type(mut self, dependency_type: DependencyType) -> Self {
        self.dependency_type = dependency_type;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    /// Returns true if both ends are the same node
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn new_edge_defaults() {
        let edge = Edge::new(id("a"), id("b"));
        assert_eq!(edge.dependency_type, DependencyType::Sequential);
        assert_eq!(edge.strength, Strength::Medium);
        assert!(edge.required);
        assert!(edge.id.is_generated());
    }

    #[test]
    fn builder_methods() {
        let edge = Edge::new(id("a"), id("b"))
            .of_type(DependencyType::Conditional)
            .optional()
            .with_strength(Strength::Strong);

        assert_eq!(edge.dependency_type, DependencyType::Conditional);
        assert!(!edge.required);
        assert_eq!(edge.strength, Strength::Strong);
    }

    #[test]
    fn self_loop_detection() {
        assert!(Edge::new(id("a"), id("a")).is_self_loop());
        assert!(!Edge::new(id("a"), id("b")).is_self_loop());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let json = r#"{"id":"e1","from":"a","to":"b"}"#;
        let edge: Edge = serde_json::from_str(json).unwrap();

        assert_eq!(edge.dependency_type, DependencyType::Sequential);
        assert!(edge.required);
        assert_eq!(edge.strength, Strength::Medium);
    }

    #[test]
    fn type_field_is_renamed() {
        let edge = Edge::with_id(EdgeId::new("e1").unwrap(), id("a"), id("b"))
            .of_type(DependencyType::Parallel);
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains("\"type\":\"parallel\""));
    }
}
