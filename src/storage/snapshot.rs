//! JSON snapshot storage for process graphs
//!
//! A snapshot is one JSON document `{ "nodes": [...], "edges": [...] }`
//! holding the serde form of the domain types. Reads take a shared lock,
//! writes go through a locked temp file and an atomic rename.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Edge, GraphError, GraphStore, Node, ProcessGraph};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot not found: {0}")]
    NotFound(PathBuf),

    #[error("Snapshot is inconsistent: {0}")]
    Inconsistent(#[from] GraphError),
}

/// Serialized form of a process graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    /// Captures a graph in its node and edge order
    pub fn capture(graph: &ProcessGraph) -> Self {
        Self {
            nodes: graph.all_nodes().into_iter().cloned().collect(),
            edges: graph.edges_where(|_| true).into_iter().cloned().collect(),
        }
    }

    /// Rebuilds the graph, rejecting duplicates and dangling edges
    pub fn into_graph(self) -> Result<ProcessGraph, SnapshotError> {
        Ok(ProcessGraph::from_parts(self.nodes, self.edges)?)
    }
}

/// Store for a graph snapshot file
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot document
    pub fn read(&self) -> Result<GraphSnapshot> {
        if !self.path.exists() {
            return Err(SnapshotError::NotFound(self.path.clone()).into());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open snapshot: {}", self.path.display()))?;

        file.lock_shared()
            .context("Failed to acquire read lock on snapshot")?;

        let snapshot: GraphSnapshot = serde_json::from_reader(BufReader::new(&file))
            .with_context(|| format!("Failed to parse snapshot: {}", self.path.display()))?;

        Ok(snapshot)
    }

    /// Reads and rebuilds the graph
    pub fn load(&self) -> Result<ProcessGraph> {
        let graph = self
            .read()?
            .into_graph()
            .with_context(|| format!("Invalid graph in {}", self.path.display()))?;
        tracing::debug!(
            path = %self.path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded snapshot"
        );
        Ok(graph)
    }

    /// Writes the graph (full rewrite)
    pub fn save(&self, graph: &ProcessGraph) -> Result<()> {
        self.write(&GraphSnapshot::capture(graph))
    }

    pub fn write(&self, snapshot: &GraphSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on snapshot")?;

            let mut writer = BufWriter::new(&file);
            serde_json::to_writer_pretty(&mut writer, snapshot)
                .context("Failed to serialize snapshot")?;
            writeln!(writer).context("Failed to write snapshot")?;
            writer.flush().context("Failed to flush snapshot")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!(path = %self.path.display(), "wrote snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyType, NodeId, NodeStatus};
    use tempfile::TempDir;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("graph.json"));

        let err = store.read().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::NotFound(_))
        ));
    }

    #[test]
    fn minimal_document_parses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"{
  "nodes": [
    {"id": "a", "name": "Design", "status": "completed"},
    {"id": "b", "name": "Build"}
  ],
  "edges": [
    {"id": "e1", "from": "a", "to": "b", "type": "parallel"}
  ]
}"#,
        )
        .unwrap();

        let graph = SnapshotStore::new(&path).load().unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node(&id("a")).unwrap().status(), NodeStatus::Completed);
        assert_eq!(graph.node(&id("b")).unwrap().status(), NodeStatus::Pending);

        let edge = graph.outgoing(&id("a"))[0];
        assert_eq!(edge.dependency_type, DependencyType::Parallel);
        assert!(edge.required);
    }

    #[test]
    fn save_then_load_preserves_graph() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("graph.json"));

        let graph = ProcessGraph::from_parts(
            [
                Node::restored(id("a"), "A", NodeStatus::Archived),
                Node::new(id("b"), "B"),
            ],
            [Edge::new(id("a"), id("b")).optional()],
        )
        .unwrap();

        store.save(&graph).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(GraphSnapshot::capture(&loaded), GraphSnapshot::capture(&graph));
        assert!(!dir.path().join("nested").join("graph.json.tmp").exists());
    }

    #[test]
    fn unknown_status_in_snapshot_loads_as_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"{"nodes": [{"id": "a", "name": "A", "status": "done"}, {"id": "b", "name": "B", "status": "archived"}], "edges": []}"#,
        )
        .unwrap();

        let graph = SnapshotStore::new(&path).load().unwrap();
        assert_eq!(graph.node(&id("a")).unwrap().status(), NodeStatus::Pending);
        assert_eq!(graph.node(&id("b")).unwrap().status(), NodeStatus::Archived);
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"{"nodes": [{"id": "a", "name": "A"}], "edges": [{"id": "e1", "from": "a", "to": "ghost"}]}"#,
        )
        .unwrap();

        let err = SnapshotStore::new(&path).load().unwrap_err();
        assert!(format!("{:#}", err).contains("ghost"));
    }

    #[test]
    fn malformed_json_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SnapshotStore::new(&path).read().unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse snapshot"));
    }
}
