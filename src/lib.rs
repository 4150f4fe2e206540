//! procflow - reactive status propagation over process dependency graphs
//!
//! Nodes are units of work, directed edges are "must precede" dependencies.
//! Changing a node's status through [`Engine::update_status`] blocks or
//! unlocks downstream work and feeds a small rule engine that settles to a
//! fixpoint. Graph analysis (cycles, critical path, bottlenecks) and a
//! structured [`Report`](engine::report::Report) sit on top.

pub mod domain;
pub mod engine;
pub mod storage;
pub mod cli;

pub use domain::{Edge, EdgeId, GraphStore, Node, NodeId, NodeStatus, ProcessGraph};
pub use engine::{Engine, EngineConfig};
