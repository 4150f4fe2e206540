//! # Propagation Engine
//!
//! Reactive status propagation over a process graph.
//!
//! ## Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`transition`] | The single status mutation entry point, block/unlock cascades |
//! | [`rules`] | Named reactive rules keyed by trigger |
//! | [`scheduler`] | Deferred event queue drained to fixpoint |
//! | [`analysis`] | Cycles, critical path, bottlenecks |
//! | [`report`] | Structured summary for dashboards and export |
//! | [`notify`] | Fire-and-forget user feedback |
//!
//! ## Control Flow
//!
//! ```text
//! update_status ──► Blocked ─────────► cascade_block (sync)
//!               ├─► Completed/Archived ► unlock_successors (sync) + UnblockCheck (queued)
//!               └─► other ─────────────► StatusChange (queued)
//!
//! drain: take batch ► rules / unblock checks ► (may call update_status) ► repeat until empty
//! ```
//!
//! An [`Engine`] is an explicit context object owning one graph. Engines are
//! independent of each other; there is no global state.

pub mod analysis;
pub mod notify;
pub mod report;
pub mod rules;
pub mod scheduler;
mod transition;

pub use transition::{InitialCheck, Transition};

use serde::{Deserialize, Serialize};

use crate::domain::{Edge, EdgeId, GraphError, GraphStore, Node, NodeId, ProcessGraph};
use notify::{Notifier, TracingNotifier};
use rules::{default_rules, Rule, RuleAction, RuleError, RuleRegistry, AUTO_ACTIVATE_AFTER_ARCHIVED};
use scheduler::{DrainStats, Event, EventQueue};

/// Toggles for the built-in rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRulesConfig {
    /// Activate a node once every predecessor is archived
    pub auto_activate_after_archived_predecessors: bool,
}

impl Default for DefaultRulesConfig {
    fn default() -> Self {
        Self {
            auto_activate_after_archived_predecessors: true,
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of queue passes per drain before pending events are dropped
    pub max_drain_passes: usize,

    /// Built-in rule toggles
    pub default_rules: DefaultRulesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: 1000,
            default_rules: DefaultRulesConfig::default(),
        }
    }
}

/// Status propagation context for one process graph
pub struct Engine {
    graph: ProcessGraph,
    rules: RuleRegistry,
    queue: EventQueue,
    notifier: Box<dyn Notifier>,
    config: EngineConfig,
    last_drain: DrainStats,
}

impl Engine {
    /// Creates an engine with the default configuration and a tracing notifier
    pub fn new(graph: ProcessGraph) -> Self {
        Self::with_config(graph, EngineConfig::default())
    }

    pub fn with_config(graph: ProcessGraph, config: EngineConfig) -> Self {
        let mut rules = RuleRegistry::new();
        for mut rule in default_rules() {
            rule.enabled = match rule.name.as_str() {
                AUTO_ACTIVATE_AFTER_ARCHIVED => {
                    config.default_rules.auto_activate_after_archived_predecessors
                }
                _ => true,
            };
            rules.register(rule);
        }

        Self {
            graph,
            rules,
            queue: EventQueue::new(),
            notifier: Box::new(TracingNotifier),
            config,
            last_drain: DrainStats::default(),
        }
    }

    /// Replaces the notifier
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn graph(&self) -> &ProcessGraph {
        &self.graph
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Adds or replaces a rule
    pub fn register_rule(&mut self, rule: Rule) {
        self.rules.register(rule);
    }

    /// Number of events waiting for the next drain
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Statistics of the most recent outermost drain
    pub fn last_drain(&self) -> DrainStats {
        self.last_drain
    }

    /// Adds a node
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        self.graph.add_node(node)
    }

    /// Removes a node and its incident edges, then lets rules re-check its
    /// former successors
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let successors = self.graph.successors(id);
        let removed = self.graph.remove_node(id)?;

        for successor in successors.into_iter().filter(|s| s != id) {
            self.queue.enqueue(Event::DependencyCheck { node: successor });
        }
        self.drain();
        Some(removed)
    }

    /// Adds an edge, then lets rules re-check its target.
    ///
    /// Cycles are accepted. An edge that closes one is logged and every
    /// cycle in the graph is passed to the notifier.
    pub fn connect(&mut self, edge: Edge) -> Result<(), GraphError> {
        let (source, target) = (edge.from.clone(), edge.to.clone());
        let edge_id = edge.id.clone();
        self.graph.add_edge(edge)?;

        if analysis::reaches(&self.graph, &target, &source) {
            let cycles = self.detect_cycles();
            tracing::warn!(edge = %edge_id, cycles = cycles.len(), "edge closes a dependency cycle");
            let named: Vec<Vec<String>> = cycles.iter().map(|c| self.names_of(c)).collect();
            self.notifier.on_cycles_detected(&named);
        }

        self.queue.enqueue(Event::DependencyCheck { node: target });
        self.drain();
        Ok(())
    }

    /// Removes an edge, then lets rules re-check its target
    pub fn disconnect(&mut self, id: &EdgeId) -> Option<Edge> {
        let edge = self.graph.remove_edge(id)?;
        self.queue.enqueue(Event::DependencyCheck {
            node: edge.to.clone(),
        });
        self.drain();
        Some(edge)
    }

    /// Processes queued events until a pass comes back empty.
    ///
    /// Calls made while a drain is running return immediately; the events
    /// they enqueue are picked up by the running drain's next pass.
    pub fn drain(&mut self) -> DrainStats {
        let mut stats = DrainStats::default();
        if !self.queue.begin() {
            return stats;
        }

        loop {
            let batch = self.queue.take_batch();
            if batch.is_empty() {
                break;
            }

            if stats.passes >= self.config.max_drain_passes {
                stats.dropped = batch.len() + self.queue.clear();
                tracing::error!(
                    passes = stats.passes,
                    dropped = stats.dropped,
                    "event queue did not settle, dropping remaining events"
                );
                break;
            }

            stats.passes += 1;
            tracing::trace!(pass = stats.passes, events = batch.len(), "drain pass");
            for event in batch {
                self.handle_event(&event);
                stats.events_processed += 1;
            }
        }

        self.queue.finish();
        self.last_drain = stats;
        stats
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::UnblockCheck { node } => {
                self.check_unblock_opportunities(node);
            }
            Event::StatusChange { .. } | Event::DependencyCheck { .. } => {
                self.dispatch_rules(event);
            }
        }
    }

    /// Runs every matching rule for `event`, logging and skipping failures
    fn dispatch_rules(&mut self, event: &Event) {
        let mut index = 0;
        while index < self.rules.len() {
            if let Some(fired) = self.rules.evaluate_at(index, event, &self.graph) {
                if let Err(err) = self.run_action(fired.action, event.node()) {
                    tracing::warn!(rule = %fired.name, node = %event.node(), error = %err, "rule action failed");
                }
            }
            index += 1;
        }
    }

    fn run_action(&mut self, action: RuleAction, node: &NodeId) -> Result<(), RuleError> {
        if !self.graph.contains(node) {
            return Err(RuleError::NodeNotFound(node.clone()));
        }

        match action {
            RuleAction::SetStatus(status) => {
                self.update_status(node, status);
            }
            RuleAction::SetSuccessorsStatus(status) => {
                for successor in self.graph.successors(node) {
                    self.update_status(&successor, status);
                }
            }
            RuleAction::UnlockSuccessors => {
                self.unlock_successors(node);
            }
            RuleAction::CascadeBlock => {
                self.cascade_block(node);
            }
            RuleAction::Log(message) => {
                tracing::info!(node = %node, "{}", message);
            }
            RuleAction::Custom(action) => action(self, node)?,
        }
        Ok(())
    }

    /// Resolves node IDs to display names, falling back to the ID
    fn names_of(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                self.graph
                    .node(id)
                    .map(|n| n.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect()
    }

    /// Runs cycle detection over the current graph
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        analysis::detect_cycles(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStatus;
    use notify::{Notification, RecordingNotifier};
    use rules::{RuleCondition, Trigger};
    use std::cell::Cell;
    use std::rc::Rc;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn engine(nodes: &[(&str, NodeStatus)], edges: &[(&str, &str)]) -> Engine {
        let nodes = nodes
            .iter()
            .map(|(n, s)| Node::restored(id(n), n.to_uppercase(), *s));
        let edges = edges.iter().map(|(f, t)| {
            Edge::with_id(EdgeId::new(format!("{}-{}", f, t)).unwrap(), id(f), id(t))
        });
        Engine::new(ProcessGraph::from_parts(nodes, edges).unwrap())
    }

    fn status(engine: &Engine, node: &str) -> NodeStatus {
        engine.graph().node(&id(node)).unwrap().status()
    }

    #[test]
    fn default_rules_are_registered() {
        let e = engine(&[], &[]);
        assert!(e.rules().get(AUTO_ACTIVATE_AFTER_ARCHIVED).unwrap().enabled);
    }

    #[test]
    fn default_rules_follow_config() {
        let config = EngineConfig {
            default_rules: DefaultRulesConfig {
                auto_activate_after_archived_predecessors: false,
            },
            ..EngineConfig::default()
        };
        let e = Engine::with_config(ProcessGraph::new(), config);
        assert!(!e.rules().get(AUTO_ACTIVATE_AFTER_ARCHIVED).unwrap().enabled);
    }

    #[test]
    fn connecting_archived_predecessor_activates_target() {
        let mut e = engine(&[("a", NodeStatus::Archived), ("b", NodeStatus::Pending)], &[]);

        e.connect(Edge::new(id("a"), id("b"))).unwrap();

        assert_eq!(status(&e, "b"), NodeStatus::Active);
        assert_eq!(
            e.rules().execution_counts().get(AUTO_ACTIVATE_AFTER_ARCHIVED),
            Some(&1)
        );
    }

    #[test]
    fn connecting_completed_predecessor_leaves_target_alone() {
        let mut e = engine(&[("a", NodeStatus::Completed), ("b", NodeStatus::Pending)], &[]);
        e.connect(Edge::new(id("a"), id("b"))).unwrap();
        assert_eq!(status(&e, "b"), NodeStatus::Pending);
    }

    #[test]
    fn connecting_an_edge_that_closes_a_cycle_notifies() {
        let recorder = RecordingNotifier::new();
        let mut e = engine(
            &[
                ("a", NodeStatus::Pending),
                ("b", NodeStatus::Pending),
                ("c", NodeStatus::Pending),
            ],
            &[("a", "b"), ("b", "c")],
        )
        .with_notifier(recorder.clone());

        e.connect(Edge::new(id("a"), id("c"))).unwrap();
        assert!(recorder.notifications().is_empty());

        e.connect(Edge::new(id("c"), id("a"))).unwrap();
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Cycles {
                cycles: vec![vec!["A".into(), "B".into(), "C".into()]],
            }]
        );
    }

    #[test]
    fn connecting_a_self_loop_notifies() {
        let recorder = RecordingNotifier::new();
        let mut e = engine(&[("a", NodeStatus::Pending)], &[]).with_notifier(recorder.clone());

        e.connect(Edge::new(id("a"), id("a"))).unwrap();

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Cycles {
                cycles: vec![vec!["A".into()]],
            }]
        );
    }

    #[test]
    fn disconnecting_last_open_predecessor_activates_target() {
        let mut e = engine(
            &[
                ("a", NodeStatus::Archived),
                ("b", NodeStatus::Pending),
                ("c", NodeStatus::Pending),
            ],
            &[("a", "c"), ("b", "c")],
        );
        assert_eq!(status(&e, "c"), NodeStatus::Pending);

        let removed = e.disconnect(&EdgeId::new("b-c").unwrap()).unwrap();

        assert_eq!(removed.from, id("b"));
        assert_eq!(status(&e, "c"), NodeStatus::Active);
        assert_eq!(
            e.rules().execution_counts().get(AUTO_ACTIVATE_AFTER_ARCHIVED),
            Some(&1)
        );
        assert!(e.disconnect(&EdgeId::new("b-c").unwrap()).is_none());
    }

    #[test]
    fn cascade_block_rule_leaves_its_own_node_alone_on_a_cycle() {
        let mut e = engine(
            &[("a", NodeStatus::Pending), ("b", NodeStatus::Pending)],
            &[("a", "b"), ("b", "a")],
        );
        e.register_rule(Rule::new(
            "block-downstream",
            Trigger::StatusChange,
            RuleCondition::TransitionedTo(NodeStatus::Active),
            RuleAction::CascadeBlock,
        ));

        e.update_status(&id("a"), NodeStatus::Active);

        assert_eq!(status(&e, "a"), NodeStatus::Active);
        assert_eq!(status(&e, "b"), NodeStatus::Blocked);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let mut e = engine(
            &[("a", NodeStatus::Pending), ("b", NodeStatus::Pending)],
            &[("a", "b")],
        );
        assert!(e.remove_node(&id("a")).is_some());
        assert_eq!(e.graph().edge_count(), 0);
        assert!(e.remove_node(&id("a")).is_none());
    }

    #[test]
    fn failing_rule_does_not_stop_later_rules() {
        let mut e = engine(&[("a", NodeStatus::Pending)], &[]);
        let ran = Rc::new(Cell::new(false));
        let seen = ran.clone();

        e.register_rule(Rule::new(
            "explodes",
            Trigger::StatusChange,
            RuleCondition::Always,
            RuleAction::Custom(Rc::new(|_, _| Err(RuleError::Failed("boom".into())))),
        ));
        e.register_rule(Rule::new(
            "records",
            Trigger::StatusChange,
            RuleCondition::Always,
            RuleAction::Custom(Rc::new(move |_, _| {
                seen.set(true);
                Ok(())
            })),
        ));

        e.update_status(&id("a"), NodeStatus::Active);

        assert!(ran.get());
        let counts = e.rules().execution_counts();
        assert_eq!(counts.get("explodes"), Some(&1));
        assert_eq!(counts.get("records"), Some(&1));
    }

    #[test]
    fn runaway_rules_hit_the_pass_limit() {
        let config = EngineConfig {
            max_drain_passes: 10,
            ..EngineConfig::default()
        };
        let graph = ProcessGraph::from_parts([Node::new(id("a"), "A")], Vec::<Edge>::new()).unwrap();
        let mut e = Engine::with_config(graph, config);

        e.register_rule(Rule::new(
            "to-pending",
            Trigger::StatusChange,
            RuleCondition::TransitionedTo(NodeStatus::Active),
            RuleAction::SetStatus(NodeStatus::Pending),
        ));
        e.register_rule(Rule::new(
            "to-active",
            Trigger::StatusChange,
            RuleCondition::TransitionedTo(NodeStatus::Pending),
            RuleAction::SetStatus(NodeStatus::Active),
        ));

        e.update_status(&id("a"), NodeStatus::Active);

        let stats = e.last_drain();
        assert_eq!(stats.passes, 10);
        assert!(stats.dropped > 0);
        assert_eq!(e.pending_events(), 0);
    }

    #[test]
    fn rule_actions_reenter_transition_core() {
        let mut e = engine(
            &[("a", NodeStatus::Pending), ("b", NodeStatus::Pending)],
            &[("a", "b")],
        );
        e.register_rule(Rule::new(
            "pull-successors",
            Trigger::StatusChange,
            RuleCondition::TransitionedTo(NodeStatus::Active),
            RuleAction::SetSuccessorsStatus(NodeStatus::Active),
        ));

        e.update_status(&id("a"), NodeStatus::Active);

        assert_eq!(status(&e, "b"), NodeStatus::Active);
        // both a and b transitioned to Active
        assert_eq!(e.rules().execution_counts().get("pull-successors"), Some(&2));
    }

    #[test]
    fn engines_are_independent() {
        let mut first = engine(&[("a", NodeStatus::Pending)], &[]);
        let second = engine(&[("a", NodeStatus::Pending)], &[]);

        first.update_status(&id("a"), NodeStatus::Active);

        assert_eq!(status(&first, "a"), NodeStatus::Active);
        assert_eq!(status(&second, "a"), NodeStatus::Pending);
    }
}
