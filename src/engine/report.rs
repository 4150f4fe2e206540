//! Report generation
//!
//! Pure aggregation over the graph and rule registry. The serialized
//! shape (camelCase keys) is what export features write to disk.

use serde::Serialize;
use std::collections::BTreeMap;

use super::analysis::{
    bottlenecks, critical_path, degree_metrics, detect_cycles, Bottleneck, CriticalPath, Risk,
};
use super::rules::RuleRegistry;
use super::Engine;
use crate::domain::{GraphStore, NodeStatus};

/// Critical paths at least this long trigger a recommendation
pub const LONG_CRITICAL_PATH: usize = 10;

/// Share of blocked nodes that triggers a recommendation
pub const BLOCKED_RATIO_WARNING: f64 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetrics {
    pub avg_in_degree: f64,
    pub avg_out_degree: f64,
    pub max_in_degree: usize,
    pub max_out_degree: usize,
    pub isolated_node_count: usize,
    pub cycle_count: usize,
    pub self_loop_count: usize,
}

/// Read-only snapshot of the graph's structure and rule activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub rule_executions: BTreeMap<String, u64>,
    pub metrics: ReportMetrics,
    pub critical_path: CriticalPath,
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<String>,
}

impl Report {
    /// Builds a report from any graph store and rule registry
    pub fn build<G: GraphStore>(graph: &G, rules: &RuleRegistry) -> Self {
        let degrees = degree_metrics(graph);
        let cycles = detect_cycles(graph);

        let metrics = ReportMetrics {
            avg_in_degree: degrees.avg_in_degree,
            avg_out_degree: degrees.avg_out_degree,
            max_in_degree: degrees.max_in_degree,
            max_out_degree: degrees.max_out_degree,
            isolated_node_count: degrees.isolated_node_count,
            cycle_count: cycles.len(),
            self_loop_count: graph.edges_where(|edge| edge.is_self_loop()).len(),
        };

        let total_nodes = graph.node_count();
        let blocked_nodes = graph
            .all_nodes()
            .iter()
            .filter(|n| n.status() == NodeStatus::Blocked)
            .count();

        let critical_path = critical_path(graph);
        let bottlenecks = bottlenecks(graph);
        let recommendations = recommend(&metrics, &critical_path, &bottlenecks, blocked_nodes, total_nodes);

        Self {
            total_nodes,
            total_edges: graph.edge_count(),
            rule_executions: rules.execution_counts(),
            metrics,
            critical_path,
            bottlenecks,
            recommendations,
        }
    }
}

fn recommend(
    metrics: &ReportMetrics,
    critical_path: &CriticalPath,
    bottlenecks: &[Bottleneck],
    blocked_nodes: usize,
    total_nodes: usize,
) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.cycle_count > 0 {
        out.push(format!(
            "{} cyclic dependencies block the workflow; break at least one edge in each cycle",
            metrics.cycle_count
        ));
    }

    if metrics.self_loop_count > 0 {
        out.push(format!(
            "{} self-loops make nodes depend on themselves; remove those edges",
            metrics.self_loop_count
        ));
    }

    let high_risk = bottlenecks.iter().filter(|b| b.risk == Risk::High).count();
    if high_risk > 0 {
        out.push(format!(
            "{} high-risk bottlenecks concentrate the workflow; consider splitting their work",
            high_risk
        ));
    }

    if metrics.isolated_node_count > 0 {
        out.push(format!(
            "{} isolated nodes are not connected to the workflow",
            metrics.isolated_node_count
        ));
    }

    if critical_path.length >= LONG_CRITICAL_PATH {
        out.push(format!(
            "Critical path spans {} steps; look for work that can run in parallel",
            critical_path.length
        ));
    }

    if total_nodes > 0 {
        let ratio = blocked_nodes as f64 / total_nodes as f64;
        if ratio >= BLOCKED_RATIO_WARNING {
            out.push(format!(
                "{:.0}% of nodes are blocked; resolve the upstream blockers first",
                ratio * 100.0
            ));
        }
    }

    out
}

impl Engine {
    /// Read-only report over the current graph
    pub fn generate_report(&self) -> Report {
        Report::build(&self.graph, &self.rules)
    }
}
