//! Identifiers for nodes and edges
//!
//! ID Format:
//! - Node IDs: caller supplied, non-empty, no whitespace (e.g., `review`, `n-42`)
//! - Edge IDs: caller supplied, or generated as `e-{7-char-hash}` (e.g., `e-7f2b4c1`)
//!
//! Generated edge hashes are derived from the endpoints plus the creation
//! timestamp, so the same pair connected twice gets two distinct IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid node ID: expected a non-empty string without whitespace, got '{0}'")]
    InvalidNodeId(String),

    #[error("Invalid edge ID: expected a non-empty string without whitespace, got '{0}'")]
    InvalidEdgeId(String),
}

fn is_valid_id(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

/// Generates a 7-character hash from the edge endpoints and timestamp
fn generate_hash(from: &NodeId, to: &NodeId, timestamp: DateTime<Utc>) -> String {
    let input = format!(
        "{}->{}@{}",
        from,
        to,
        timestamp.timestamp_nanos_opt().unwrap_or(0)
    );
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..7].to_string()
}

/// Stable identifier of a node in the process graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID, validating its format
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if is_valid_id(&id) {
            Ok(Self(id))
        } else {
            Err(IdError::InvalidNodeId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Identifier of a dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeId(String);

impl EdgeId {
    /// Creates an edge ID, validating its format
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if is_valid_id(&id) {
            Ok(Self(id))
        } else {
            Err(IdError::InvalidEdgeId(id))
        }
    }

    /// Generates an `e-{hash}` ID for an edge between two nodes
    pub fn generate(from: &NodeId, to: &NodeId, timestamp: DateTime<Utc>) -> Self {
        Self(format!("e-{}", generate_hash(from, to, timestamp)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this ID has the generated `e-{hash}` shape
    pub fn is_generated(&self) -> bool {
        self.0
            .strip_prefix("e-")
            .map(|hash| hash.len() == 7 && hash.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for EdgeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EdgeId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EdgeId> for String {
    fn from(id: EdgeId) -> Self {
        id.0
    }
}
