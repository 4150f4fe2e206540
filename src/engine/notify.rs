//! User-facing feedback channel
//!
//! Notifications are fire-and-forget; the engine never depends on their
//! delivery.

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of a block cascade that blocked at least one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeResult {
    pub blocked_count: usize,
    pub blocked_names: Vec<String>,
}

/// Outcome of an unlock pass that activated at least one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockResult {
    pub unlocked_count: usize,
    pub unlocked_names: Vec<String>,
}

impl CascadeResult {
    pub fn summary(&self) -> String {
        format!(
            "{} node(s) blocked: {}",
            self.blocked_count,
            self.blocked_names.join(", ")
        )
    }
}

impl UnlockResult {
    pub fn summary(&self) -> String {
        format!(
            "{} node(s) unlocked: {}",
            self.unlocked_count,
            self.unlocked_names.join(", ")
        )
    }
}

/// Receives cascade feedback from the engine
pub trait Notifier {
    fn on_cascade_result(&self, _result: &CascadeResult) {}

    fn on_unlock_result(&self, _result: &UnlockResult) {}

    /// Each cycle is given as the ordered node names along it
    fn on_cycles_detected(&self, _cycles: &[Vec<String>]) {}
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {}

/// Logs notifications through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn on_cascade_result(&self, result: &CascadeResult) {
        tracing::info!(count = result.blocked_count, "{}", result.summary());
    }

    fn on_unlock_result(&self, result: &UnlockResult) {
        tracing::info!(count = result.unlocked_count, "{}", result.summary());
    }

    fn on_cycles_detected(&self, cycles: &[Vec<String>]) {
        for cycle in cycles {
            tracing::warn!(length = cycle.len(), "cycle detected: {}", cycle.join(" -> "));
        }
    }
}

/// A notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Cascade(CascadeResult),
    Unlock(UnlockResult),
    Cycles { cycles: Vec<Vec<String>> },
}

/// Keeps every notification in memory
///
/// Clones share the same buffer, so one handle can be given to the engine
/// and another kept to read the results back.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    received: Rc<RefCell<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.received.borrow().clone()
    }

    pub fn clear(&self) {
        self.received.borrow_mut().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn on_cascade_result(&self, result: &CascadeResult) {
        self.received
            .borrow_mut()
            .push(Notification::Cascade(result.clone()));
    }

    fn on_unlock_result(&self, result: &UnlockResult) {
        self.received
            .borrow_mut()
            .push(Notification::Unlock(result.clone()));
    }

    fn on_cycles_detected(&self, cycles: &[Vec<String>]) {
        self.received.borrow_mut().push(Notification::Cycles {
            cycles: cycles.to_vec(),
        });
    }
}
