//! Propagation commands (check, status)

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::app::Session;
use super::output::{join_ids, node_rows, print_node_table, NodeRow, Output};
use crate::domain::{GraphError, GraphStore, NodeId, NodeStatus};
use crate::engine::{InitialCheck, Transition};

#[derive(Serialize)]
struct CheckOutput {
    #[serde(flatten)]
    check: InitialCheck,
    nodes: Vec<NodeRow>,
}

#[derive(Serialize)]
struct StatusOutput {
    transition: Transition,
    nodes: Vec<NodeRow>,
    written: bool,
}

/// Re-derive cascades for the stored statuses and report cycles
pub fn check(session: Session, output: &Output) -> Result<()> {
    let mut engine = session.engine;
    let check = engine.perform_initial_check();

    output.verbose_ctx(
        "check",
        &format!(
            "Drained {} events in {} passes",
            check.drain.events_processed, check.drain.passes
        ),
    );

    if output.is_json() {
        output.data(&CheckOutput {
            check,
            nodes: node_rows(engine.graph()),
        });
        return Ok(());
    }

    println!(
        "Checked {} nodes, {} edges",
        engine.graph().node_count(),
        engine.graph().edge_count()
    );
    println!("Blocked:  {}", join_ids(&check.blocked));
    println!("Unlocked: {}", join_ids(&check.unlocked));

    if check.cycles.is_empty() {
        println!("No cycles detected.");
    } else {
        println!("Cycles ({}):", check.cycles.len());
        for cycle in &check.cycles {
            let mut ids: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
            if let Some(first) = ids.first().copied() {
                ids.push(first);
            }
            println!("  {}", ids.join(" -> "));
        }
    }

    if check.drain.dropped > 0 {
        println!(
            "Warning: {} events dropped after the drain pass limit",
            check.drain.dropped
        );
    }

    Ok(())
}

/// Apply one status change and show what propagated
pub fn status(
    session: Session,
    output: &Output,
    node: &str,
    status: &str,
    write: bool,
) -> Result<()> {
    let Session { store, mut engine } = session;

    let id = NodeId::new(node).context("Invalid node ID")?;
    let status: NodeStatus = status.parse().context("Invalid status")?;
    if !engine.graph().contains(&id) {
        bail!(GraphError::NodeNotFound(id));
    }

    let mut drain = engine.perform_initial_check().drain;
    let transition = engine.update_status(&id, status);
    drain.merge(engine.last_drain());

    output.verbose_ctx(
        "status",
        &format!(
            "Drained {} events in {} passes ({} dropped)",
            drain.events_processed, drain.passes, drain.dropped
        ),
    );

    if write {
        store.save(engine.graph())?;
        output.verbose_ctx("status", &format!("Wrote {}", store.path().display()));
    }

    if output.is_json() {
        output.data(&StatusOutput {
            transition,
            nodes: node_rows(engine.graph()),
            written: write,
        });
        return Ok(());
    }

    match &transition.change {
        Some(change) => println!("{}: {} -> {}", id, change.from, change.to),
        None => println!("{}: already {}", id, status),
    }
    if !transition.blocked.is_empty() {
        println!("Blocked:  {}", join_ids(&transition.blocked));
    }
    if !transition.unlocked.is_empty() {
        println!("Unlocked: {}", join_ids(&transition.unlocked));
    }
    println!();
    print_node_table(&node_rows(engine.graph()));

    if write {
        println!();
        output.success(&format!("Saved {}", store.path().display()));
    }

    Ok(())
}
