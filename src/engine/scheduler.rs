//! Event queue for deferred engine work
//!
//! The queue is single-threaded and cooperative. The engine drains it in
//! passes: each pass takes a snapshot of the pending events and clears the
//! live queue, so events produced while handling a pass land in the next
//! one instead of recursing. Draining stops at the first empty pass.

use serde::Serialize;
use std::collections::VecDeque;

use super::rules::Trigger;
use crate::domain::{NodeId, NodeStatus};

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A node changed status outside the block/unlock branches
    StatusChange {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// A node's dependencies should be re-evaluated by rules
    DependencyCheck { node: NodeId },
    /// Re-scan the blocked successors of a node that just became fulfilled
    UnblockCheck { node: NodeId },
}

impl Event {
    pub fn node(&self) -> &NodeId {
        match self {
            Event::StatusChange { node, .. }
            | Event::DependencyCheck { node }
            | Event::UnblockCheck { node } => node,
        }
    }

    /// The rule trigger this event dispatches to, if any
    pub fn trigger(&self) -> Option<Trigger> {
        match self {
            Event::StatusChange { .. } => Some(Trigger::StatusChange),
            Event::DependencyCheck { .. } => Some(Trigger::DependencyCheck),
            Event::UnblockCheck { .. } => None,
        }
    }
}

/// Counters describing one drain to fixpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Non-empty passes handled
    pub passes: usize,
    pub events_processed: usize,
    /// Events discarded after the pass limit was hit
    pub dropped: usize,
}

impl DrainStats {
    pub fn merge(&mut self, other: DrainStats) {
        self.passes += other.passes;
        self.events_processed += other.events_processed;
        self.dropped += other.dropped;
    }
}

/// FIFO of pending events with a re-entrancy guard
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<Event>,
    is_processing: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: Event) {
        tracing::trace!(?event, "enqueue");
        self.pending.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Marks the start of a drain; returns false if one is already running
    pub fn begin(&mut self) -> bool {
        if self.is_processing {
            return false;
        }
        self.is_processing = true;
        true
    }

    /// Marks the end of a drain
    pub fn finish(&mut self) {
        self.is_processing = false;
    }

    /// Snapshots the pending events and clears the live queue
    pub fn take_batch(&mut self) -> Vec<Event> {
        self.pending.drain(..).collect()
    }

    /// Drops every pending event, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
