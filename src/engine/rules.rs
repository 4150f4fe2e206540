//! Reactive rule registry
//!
//! Rules are named and keyed by trigger. Each one pairs a typed
//! [`RuleCondition`] with a typed [`RuleAction`]; the engine evaluates
//! matching rules in registration order and runs the action of every rule
//! whose condition holds. Actions may call back into the transition core.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use super::scheduler::Event;
use super::Engine;
use crate::domain::{GraphStore, Node, NodeId, NodeStatus};

/// Name of the built-in rule that activates nodes whose predecessors are all archived
pub const AUTO_ACTIVATE_AFTER_ARCHIVED: &str = "auto_activate_after_archived_predecessors";

#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Rule action failed: {0}")]
    Failed(String),
}

/// Event type a rule listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    StatusChange,
    DependencyCheck,
}

/// What a condition is evaluated against
pub struct RuleContext<'a, G: GraphStore> {
    pub graph: &'a G,
    pub node: &'a Node,
    pub new_status: NodeStatus,
    pub old_status: NodeStatus,
}

impl<G: GraphStore> RuleContext<'_, G> {
    fn predecessor_statuses(&self) -> Vec<NodeStatus> {
        self.graph
            .predecessors(&self.node.id)
            .iter()
            .filter_map(|id| self.graph.node(id))
            .map(Node::status)
            .collect()
    }
}

/// Typed predicate over `(node, new_status, old_status)`
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    Always,
    /// The node's current status is one of the given statuses
    StatusIn(Vec<NodeStatus>),
    TransitionedTo(NodeStatus),
    TransitionedFrom(NodeStatus),
    /// Every direct predecessor is Completed or Archived (true if none)
    AllPredecessorsFulfilled,
    /// Every direct predecessor is Archived (true if none)
    AllPredecessorsArchived,
    AnyPredecessorBlocked,
    HasNoPredecessors,
    All(Vec<RuleCondition>),
    Any(Vec<RuleCondition>),
    Not(Box<RuleCondition>),
}

impl RuleCondition {
    pub fn evaluate<G: GraphStore>(&self, ctx: &RuleContext<'_, G>) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::StatusIn(statuses) => statuses.contains(&ctx.node.status()),
            RuleCondition::TransitionedTo(status) => {
                ctx.new_status == *status && ctx.old_status != *status
            }
            RuleCondition::TransitionedFrom(status) => {
                ctx.old_status == *status && ctx.new_status != *status
            }
            RuleCondition::AllPredecessorsFulfilled => ctx
                .predecessor_statuses()
                .iter()
                .all(NodeStatus::is_fulfilled),
            RuleCondition::AllPredecessorsArchived => ctx
                .predecessor_statuses()
                .iter()
                .all(|s| *s == NodeStatus::Archived),
            RuleCondition::AnyPredecessorBlocked => ctx
                .predecessor_statuses()
                .iter()
                .any(|s| *s == NodeStatus::Blocked),
            RuleCondition::HasNoPredecessors => ctx.graph.predecessors(&ctx.node.id).is_empty(),
            RuleCondition::All(conditions) => conditions.iter().all(|c| c.evaluate(ctx)),
            RuleCondition::Any(conditions) => conditions.iter().any(|c| c.evaluate(ctx)),
            RuleCondition::Not(condition) => !condition.evaluate(ctx),
        }
    }
}

/// Escape hatch for behavior the typed actions cannot express
pub type CustomAction = Rc<dyn Fn(&mut Engine, &NodeId) -> Result<(), RuleError>>;

/// Typed effect of a rule, applied to the event's node
#[derive(Clone)]
pub enum RuleAction {
    SetStatus(NodeStatus),
    SetSuccessorsStatus(NodeStatus),
    UnlockSuccessors,
    CascadeBlock,
    Log(String),
    Custom(CustomAction),
}

impl fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::SetStatus(s) => f.debug_tuple("SetStatus").field(s).finish(),
            RuleAction::SetSuccessorsStatus(s) => {
                f.debug_tuple("SetSuccessorsStatus").field(s).finish()
            }
            RuleAction::UnlockSuccessors => f.write_str("UnlockSuccessors"),
            RuleAction::CascadeBlock => f.write_str("CascadeBlock"),
            RuleAction::Log(msg) => f.debug_tuple("Log").field(msg).finish(),
            RuleAction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A named reactive rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub trigger: Trigger,
    pub condition: RuleCondition,
    pub action: RuleAction,
    pub enabled: bool,
    execution_count: u64,
}

impl Rule {
    /// Creates an enabled rule
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        condition: RuleCondition,
        action: RuleAction,
    ) -> Self {
        Self {
            name: name.into(),
            trigger,
            condition,
            action,
            enabled: true,
            execution_count: 0,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }
}

/// A rule whose condition held for an event
#[derive(Debug, Clone)]
pub struct FiredRule {
    pub name: String,
    pub action: RuleAction,
}

/// Rules in registration order
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, or replaces the existing rule with the same name in place
    pub fn register(&mut self, rule: Rule) {
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => {
                tracing::debug!(rule = %rule.name, "replacing rule");
                *existing = rule;
            }
            None => {
                tracing::debug!(rule = %rule.name, trigger = ?rule.trigger, "registering rule");
                self.rules.push(rule);
            }
        }
    }

    /// Enables or disables a rule; returns false if no rule has that name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.name == name) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Execution count per rule name
    pub fn execution_counts(&self) -> BTreeMap<String, u64> {
        self.rules
            .iter()
            .map(|r| (r.name.clone(), r.execution_count))
            .collect()
    }

    /// Evaluates the rule at `index` against `event`.
    ///
    /// Returns the rule's action when the rule is enabled, listens for the
    /// event's trigger and its condition holds; the execution count is
    /// incremented in that case.
    pub fn evaluate_at<G: GraphStore>(
        &mut self,
        index: usize,
        event: &Event,
        graph: &G,
    ) -> Option<FiredRule> {
        let trigger = event.trigger()?;
        let rule = self.rules.get_mut(index)?;
        if !rule.enabled || rule.trigger != trigger {
            return None;
        }

        let node = graph.node(event.node())?;
        let (new_status, old_status) = match event {
            Event::StatusChange { from, to, .. } => (*to, *from),
            _ => (node.status(), node.status()),
        };

        let ctx = RuleContext {
            graph,
            node,
            new_status,
            old_status,
        };

        if !rule.condition.evaluate(&ctx) {
            return None;
        }

        rule.execution_count += 1;
        tracing::debug!(rule = %rule.name, node = %node.id, "rule fired");
        Some(FiredRule {
            name: rule.name.clone(),
            action: rule.action.clone(),
        })
    }

    /// Evaluates every rule against `event` without running any action
    pub fn dispatch<G: GraphStore>(&mut self, event: &Event, graph: &G) -> Vec<FiredRule> {
        (0..self.rules.len())
            .filter_map(|index| self.evaluate_at(index, event, graph))
            .collect()
    }
}

/// Built-in rules
pub fn default_rules() -> Vec<Rule> {
    vec![Rule::new(
        AUTO_ACTIVATE_AFTER_ARCHIVED,
        Trigger::DependencyCheck,
        RuleCondition::All(vec![
            RuleCondition::StatusIn(vec![NodeStatus::Pending, NodeStatus::Blocked]),
            RuleCondition::Not(Box::new(RuleCondition::HasNoPredecessors)),
            RuleCondition::AllPredecessorsArchived,
        ]),
        RuleAction::SetStatus(NodeStatus::Active),
    )]
}
