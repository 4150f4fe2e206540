//! Domain models for procflow
//!
//! Contains the process graph data model without any I/O concerns.

mod id;
mod node;
mod edge;
mod graph;

pub use id::{EdgeId, IdError, NodeId};
pub use node::{Node, NodeMetadata, NodeStatus, StatusChange, StatusError};
pub use edge::{DependencyType, Edge, Strength};
pub use graph::{GraphError, GraphStore, ProcessGraph};
