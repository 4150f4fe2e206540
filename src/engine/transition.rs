//! Status transition core
//!
//! [`Engine::update_status`] is the only sanctioned way to change a node's
//! status. After recording the change it branches on the new status:
//!
//! - **Blocked**: block every Active/Pending transitive successor, now
//! - **Completed / Archived**: activate ready direct successors now, then
//!   queue a follow-up scan of blocked successors
//! - anything else: queue a `StatusChange` event for the rules
//!
//! The branch runs even when the status did not change, so re-affirming a
//! fulfilled status re-runs the unlock. Problems (unknown nodes, bad status
//! strings) are logged and turned into no-ops; nothing is returned as an
//! error.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use super::notify::{CascadeResult, UnlockResult};
use super::scheduler::{DrainStats, Event};
use super::Engine;
use crate::domain::{GraphStore, NodeId, NodeStatus, StatusChange};

/// What one `update_status` call did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub node: NodeId,

    /// False when the node was unknown and nothing happened
    pub applied: bool,

    /// The history entry written, if the status actually changed
    pub change: Option<StatusChange>,

    /// Nodes blocked by this call's cascade
    pub blocked: Vec<NodeId>,

    /// Nodes activated by this call's unlock pass
    pub unlocked: Vec<NodeId>,
}

impl Transition {
    fn skipped(node: &NodeId) -> Self {
        Self {
            node: node.clone(),
            applied: false,
            change: None,
            blocked: Vec::new(),
            unlocked: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        self.change.is_some()
    }
}

/// What `perform_initial_check` re-derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitialCheck {
    pub blocked: Vec<NodeId>,
    pub unlocked: Vec<NodeId>,
    pub cycles: Vec<Vec<NodeId>>,
    pub drain: DrainStats,
}

impl Engine {
    /// Changes a node's status and propagates the consequences.
    ///
    /// Unknown nodes are logged and ignored. The queue is drained before
    /// returning unless this call was made from inside a running drain.
    pub fn update_status(&mut self, id: &NodeId, status: NodeStatus) -> Transition {
        let transition = self.apply_status(id, status);
        if transition.applied {
            self.drain();
        }
        transition
    }

    /// Like [`Engine::update_status`], parsing the status leniently.
    ///
    /// Unrecognized values fall back to Pending with a logged warning.
    pub fn update_status_str(&mut self, id: &NodeId, raw: &str) -> Transition {
        self.update_status(id, NodeStatus::parse_lenient(raw))
    }

    fn apply_status(&mut self, id: &NodeId, status: NodeStatus) -> Transition {
        let change = match self.graph.node_mut(id) {
            Some(node) => node.record_transition(status, Utc::now()),
            None => {
                tracing::warn!(node = %id, "status update for unknown node ignored");
                return Transition::skipped(id);
            }
        };

        if let Some(change) = &change {
            tracing::debug!(node = %id, from = %change.from, to = %change.to, "status changed");
        }

        let mut transition = Transition {
            node: id.clone(),
            applied: true,
            change: change.clone(),
            blocked: Vec::new(),
            unlocked: Vec::new(),
        };

        match status {
            NodeStatus::Blocked => {
                transition.blocked = self.cascade_block(id);
            }
            NodeStatus::Completed | NodeStatus::Archived => {
                transition.unlocked = self.activate_ready_successors(id);
                self.queue.enqueue(Event::UnblockCheck { node: id.clone() });
            }
            NodeStatus::Pending | NodeStatus::Active => {
                if let Some(change) = change {
                    self.queue.enqueue(Event::StatusChange {
                        node: id.clone(),
                        from: change.from,
                        to: change.to,
                    });
                }
            }
        }

        transition
    }

    /// Blocks every Active or Pending transitive successor of `id`.
    ///
    /// Successors that are already Blocked, Completed or Archived are left
    /// as they are but still traversed. The start node is never written,
    /// even when a cycle leads back to it: its own status belongs to the
    /// caller. Returns the nodes newly blocked, in breadth-first order.
    pub fn cascade_block(&mut self, id: &NodeId) -> Vec<NodeId> {
        if !self.graph.contains(id) {
            tracing::warn!(node = %id, "block cascade from unknown node ignored");
            return Vec::new();
        }

        let mut visited: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut queue: VecDeque<NodeId> = self.graph.successors(id).into();
        let mut blocked = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            let blockable = self
                .graph
                .node(&current)
                .map(|n| n.status().is_blockable())
                .unwrap_or(false);

            if blockable {
                // The outer traversal already covers this node's successors,
                // so the status is written without a nested cascade.
                if let Some(node) = self.graph.node_mut(&current) {
                    node.record_transition(NodeStatus::Blocked, Utc::now());
                }
                blocked.push(current.clone());
            }

            for next in self.graph.successors(&current) {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }

        if !blocked.is_empty() {
            tracing::debug!(node = %id, count = blocked.len(), "block cascade");
            self.notifier.on_cascade_result(&CascadeResult {
                blocked_count: blocked.len(),
                blocked_names: self.names_of(&blocked),
            });
        }

        blocked
    }

    /// Activates each direct successor of `id` for which
    /// [`Engine::can_activate`] holds, then drains. Returns the nodes
    /// activated.
    pub fn unlock_successors(&mut self, id: &NodeId) -> Vec<NodeId> {
        let unlocked = self.activate_ready_successors(id);
        self.drain();
        unlocked
    }

    fn activate_ready_successors(&mut self, id: &NodeId) -> Vec<NodeId> {
        if !self.graph.contains(id) {
            tracing::warn!(node = %id, "unlock from unknown node ignored");
            return Vec::new();
        }

        let mut unlocked = Vec::new();
        for successor in self.graph.successors(id) {
            if self.can_activate(&successor) {
                self.apply_status(&successor, NodeStatus::Active);
                unlocked.push(successor);
            }
        }

        self.report_unlocked(id, &unlocked);
        unlocked
    }

    /// True iff the node is Pending or Blocked and every direct predecessor
    /// is fulfilled. Nodes without predecessors are always activatable;
    /// unknown nodes never are.
    pub fn can_activate(&self, id: &NodeId) -> bool {
        let Some(node) = self.graph.node(id) else {
            return false;
        };
        if !node.status().is_unlockable() {
            return false;
        }

        self.graph.predecessors(id).iter().all(|pred| {
            self.graph
                .node(pred)
                .map(|n| n.is_fulfilled())
                .unwrap_or(false)
        })
    }

    /// Re-evaluates the Blocked direct successors of `id`, then queues a
    /// dependency check for every direct successor and drains.
    ///
    /// A blocked node with several predecessors is only released once the
    /// last of them is fulfilled; this pass catches that moment.
    pub fn check_unblock_opportunities(&mut self, id: &NodeId) -> Vec<NodeId> {
        if !self.graph.contains(id) {
            tracing::debug!(node = %id, "unblock check for removed node skipped");
            return Vec::new();
        }

        let successors = self.graph.successors(id);
        let mut unlocked = Vec::new();

        for successor in &successors {
            let blocked = self
                .graph
                .node(successor)
                .map(|n| n.status() == NodeStatus::Blocked)
                .unwrap_or(false);

            if blocked && self.can_activate(successor) {
                self.apply_status(successor, NodeStatus::Active);
                unlocked.push(successor.clone());
            }
        }

        for successor in successors {
            self.queue.enqueue(Event::DependencyCheck { node: successor });
        }

        self.report_unlocked(id, &unlocked);
        self.drain();
        unlocked
    }

    fn report_unlocked(&self, id: &NodeId, unlocked: &[NodeId]) {
        if unlocked.is_empty() {
            return;
        }
        tracing::debug!(node = %id, count = unlocked.len(), "unlocked successors");
        self.notifier.on_unlock_result(&UnlockResult {
            unlocked_count: unlocked.len(),
            unlocked_names: self.names_of(unlocked),
        });
    }

    /// Re-derives cascades for statuses restored from storage.
    ///
    /// Run once after a graph is loaded: blocks downstream of every Blocked
    /// node, unlocks downstream of every fulfilled node, drains the queue
    /// and reports any cycles.
    pub fn perform_initial_check(&mut self) -> InitialCheck {
        let nodes: Vec<(NodeId, NodeStatus)> = self
            .graph
            .all_nodes()
            .into_iter()
            .map(|n| (n.id.clone(), n.status()))
            .collect();

        let mut blocked = Vec::new();
        for (id, _) in nodes.iter().filter(|(_, s)| *s == NodeStatus::Blocked) {
            blocked.extend(self.cascade_block(id));
        }

        let mut unlocked = Vec::new();
        for (id, _) in nodes.iter().filter(|(_, s)| s.is_fulfilled()) {
            unlocked.extend(self.activate_ready_successors(id));
            self.queue.enqueue(Event::UnblockCheck { node: id.clone() });
        }

        let drain = self.drain();

        let cycles = self.detect_cycles();
        if !cycles.is_empty() {
            let named: Vec<Vec<String>> = cycles.iter().map(|c| self.names_of(c)).collect();
            self.notifier.on_cycles_detected(&named);
        }

        tracing::info!(
            nodes = nodes.len(),
            blocked = blocked.len(),
            unlocked = unlocked.len(),
            cycles = cycles.len(),
            "initial check complete"
        );

        InitialCheck {
            blocked,
            unlocked,
            cycles,
            drain,
        }
    }
}
