//! Query commands (report, ready)
//!
//! These read the stored statuses as-is; no propagation is run.

use anyhow::Result;

use super::app::Session;
use super::output::{print_node_table, NodeRow, Output};
use crate::domain::{GraphStore, NodeId};
use crate::engine::analysis::{BottleneckKind, Risk};

/// Print the structural report
pub fn report(session: Session, output: &Output) -> Result<()> {
    let report = session.engine.generate_report();

    if output.is_json() {
        output.data(&report);
        return Ok(());
    }

    println!(
        "Nodes: {}  Edges: {}",
        report.total_nodes, report.total_edges
    );
    let m = &report.metrics;
    println!(
        "Degree: avg in {:.2}, avg out {:.2}, max in {}, max out {}",
        m.avg_in_degree, m.avg_out_degree, m.max_in_degree, m.max_out_degree
    );
    println!("Isolated nodes: {}", m.isolated_node_count);
    println!("Cycles: {}", m.cycle_count);
    println!("Self-loops: {}", m.self_loop_count);

    let path = &report.critical_path;
    if path.nodes.is_empty() {
        println!("Critical path: -");
    } else {
        let ids: Vec<&str> = path.nodes.iter().map(NodeId::as_str).collect();
        println!("Critical path ({}): {}", path.length, ids.join(" -> "));
    }

    if !report.bottlenecks.is_empty() {
        println!();
        println!("Bottlenecks ({}):", report.bottlenecks.len());
        println!(
            "{:<20} {:<12} {:>4} {:>4}  RISK",
            "ID", "TYPE", "IN", "OUT"
        );
        println!("{}", "-".repeat(52));
        for b in &report.bottlenecks {
            println!(
                "{:<20} {:<12} {:>4} {:>4}  {}",
                b.node_id,
                kind_label(b.kind),
                b.in_degree,
                b.out_degree,
                risk_label(b.risk)
            );
        }
    }

    println!();
    println!("Rule executions:");
    for (name, count) in &report.rule_executions {
        println!("  {}: {}", name, count);
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for rec in &report.recommendations {
            println!("  - {}", rec);
        }
    }

    Ok(())
}

/// List nodes that could be activated now
pub fn ready(session: Session, output: &Output) -> Result<()> {
    let engine = &session.engine;
    let ready: Vec<NodeRow> = engine
        .graph()
        .all_nodes()
        .into_iter()
        .filter(|n| engine.can_activate(&n.id))
        .map(NodeRow::from)
        .collect();

    output.verbose_ctx("ready", &format!("Found {} ready nodes", ready.len()));

    if output.is_json() {
        output.data(&ready);
    } else if ready.is_empty() {
        println!("No nodes ready to activate.");
    } else {
        println!("Ready nodes ({}):", ready.len());
        print_node_table(&ready);
    }

    Ok(())
}

fn kind_label(kind: BottleneckKind) -> &'static str {
    match kind {
        BottleneckKind::Convergence => "convergence",
        BottleneckKind::Divergence => "divergence",
    }
}

fn risk_label(risk: Risk) -> &'static str {
    match risk {
        Risk::Medium => "medium",
        Risk::High => "high",
    }
}
