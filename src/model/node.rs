//! Node representation in the ownership graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node (fund, portfolio, or security)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Classification of a node.
///
/// Serializes as a lowercase string; unrecognised names round-trip
/// through `Other` so stores can carry kinds this crate doesn't know.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Portfolio,
    Equity,
    Bond,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Portfolio => "portfolio",
            NodeKind::Equity => "equity",
            NodeKind::Bond => "bond",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "portfolio" => NodeKind::Portfolio,
            "equity" => NodeKind::Equity,
            "bond" => NodeKind::Bond,
            _ => NodeKind::Other(s),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::from(s.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the ownership graph. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_kinds_parse_case_insensitively() {
        assert_eq!(NodeKind::from("Portfolio"), NodeKind::Portfolio);
        assert_eq!(NodeKind::from("BOND"), NodeKind::Bond);
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let kind = NodeKind::from("future");
        assert_eq!(kind, NodeKind::Other("future".into()));
        assert_eq!(kind.to_string(), "future");
    }

    #[test]
    fn test_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&Node::new(7, NodeKind::Equity)).unwrap();
        assert_eq!(json, r#"{"id":7,"kind":"equity"}"#);
    }
}
