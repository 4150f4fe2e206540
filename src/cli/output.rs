//! Output formatting for CLI commands

use serde::Serialize;

use crate::domain::{GraphStore, Node, NodeId, NodeStatus};
pub use crate::storage::OutputFormat;

/// Output helper for consistent formatting
pub struct Output {
    format: OutputFormat,
    verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Prints a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Prints structured data
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                // Callers normally print text themselves; this is the fallback
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Returns true if using JSON format
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Prints a verbose debug message with context (only when --verbose is set)
    pub fn verbose_ctx(&self, context: &str, message: &str) {
        if self.verbose {
            eprintln!("[verbose:{}] {}", context, message);
        }
    }
}

/// One row of a node listing
#[derive(Debug, Clone, Serialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub name: String,
    pub status: NodeStatus,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            status: node.status(),
        }
    }
}

pub fn node_rows<G: GraphStore>(graph: &G) -> Vec<NodeRow> {
    graph.all_nodes().into_iter().map(NodeRow::from).collect()
}

/// Prints a node table in text mode
pub fn print_node_table(rows: &[NodeRow]) {
    println!("{:<20} {:<30} STATUS", "ID", "NAME");
    println!("{}", "-".repeat(60));
    for row in rows {
        println!("{:<20} {:<30} {}", row.id, row.name, row.status);
    }
}

/// `a, b, c` or `-` for an empty list
pub fn join_ids(ids: &[NodeId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
