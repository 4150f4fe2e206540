//! Node domain model
//!
//! Nodes are the units of work in a process graph. Their status is
//! read-only outside the crate: the engine's transition core is the only
//! writer, so every change leaves a history entry behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::NodeId;

#[derive(Debug, Error, PartialEq)]
pub enum StatusError {
    #[error("Unknown status '{0}': expected pending, active, completed, blocked or archived")]
    Unknown(String),
}

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Blocked,
    Archived,
}

impl NodeStatus {
    /// Returns true if this status satisfies dependents (Completed or Archived)
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Archived)
    }

    /// Returns true if a block cascade may move this status to Blocked
    pub fn is_blockable(&self) -> bool {
        matches!(self, NodeStatus::Pending | NodeStatus::Active)
    }

    /// Returns true if an unlock may move this status to Active
    pub fn is_unlockable(&self) -> bool {
        matches!(self, NodeStatus::Pending | NodeStatus::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Active => "active",
            NodeStatus::Completed => "completed",
            NodeStatus::Blocked => "blocked",
            NodeStatus::Archived => "archived",
        }
    }

    /// Parses a status, falling back to Pending for unrecognized input
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|err: StatusError| {
            tracing::warn!(input = raw, error = %err, "invalid status value, falling back to pending");
            NodeStatus::Pending
        })
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(NodeStatus::Pending),
            "active" => Ok(NodeStatus::Active),
            "completed" => Ok(NodeStatus::Completed),
            "blocked" => Ok(NodeStatus::Blocked),
            "archived" => Ok(NodeStatus::Archived),
            _ => Err(StatusError::Unknown(s.to_string())),
        }
    }
}

/// Stored statuses go through [`NodeStatus::parse_lenient`], so one bad
/// value degrades to Pending instead of failing the whole load
fn lenient_status<'de, D>(deserializer: D) -> Result<NodeStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(NodeStatus::parse_lenient(&raw))
}

/// One entry of a node's status history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: NodeStatus,
    pub to: NodeStatus,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds spent in `from` before this change
    pub duration_ms: i64,
}

/// Timestamps tracked for every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_change_at: Option<DateTime<Utc>>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            last_status_change_at: None,
        }
    }
}

/// A unit of work in the process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,

    /// Human-readable label used in notifications and reports
    pub name: String,

    #[serde(default, deserialize_with = "lenient_status")]
    status: NodeStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    status_history: Vec<StatusChange>,

    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl Node {
    /// Creates a new pending node
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: NodeStatus::Pending,
            status_history: Vec::new(),
            metadata: NodeMetadata::default(),
        }
    }

    /// Creates a node whose status was restored from storage
    ///
    /// No history entry is written. Run `Engine::perform_initial_check`
    /// after loading so cascades are re-derived for restored statuses.
    pub fn restored(id: NodeId, name: impl Into<String>, status: NodeStatus) -> Self {
        let mut node = Self::new(id, name);
        node.status = status;
        node
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn is_fulfilled(&self) -> bool {
        self.status.is_fulfilled()
    }

    /// Moves the node to `to`, appending a history entry.
    ///
    /// Returns `None` when the status is unchanged.
    pub(crate) fn record_transition(
        &mut self,
        to: NodeStatus,
        now: DateTime<Utc>,
    ) -> Option<StatusChange> {
        if self.status == to {
            return None;
        }

        let since = self
            .status_history
            .last()
            .map(|entry| entry.timestamp)
            .unwrap_or(self.metadata.created_at);

        let change = StatusChange {
            from: self.status,
            to,
            timestamp: now,
            duration_ms: (now - since).num_milliseconds().max(0),
        };

        self.status = to;
        self.metadata.last_status_change_at = Some(now);
        self.status_history.push(change.clone());
        Some(change)
    }
}
