//! Root-to-leaf ownership paths

use super::edge::Position;
use super::node::NodeId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An ordered root-to-node path with the quantity and weight accumulated
/// along its edges.
///
/// Index 0 is the root; the last index is the most specific node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafPath {
    nodes: Vec<NodeId>,
    quantity: Decimal,
    weight: Decimal,
}

impl LeafPath {
    /// A single-node path starting at `root`
    pub fn root(root: NodeId) -> Self {
        Self {
            nodes: vec![root],
            quantity: Decimal::ONE,
            weight: Decimal::ONE,
        }
    }

    /// Extend the path along `position`.
    ///
    /// Returns `None` if the accumulated quantity or weight overflows.
    pub fn extend(&self, position: &Position) -> Option<Self> {
        let quantity = self.quantity.checked_mul(position.quantity_factor())?;
        let weight = self.weight.checked_mul(position.weight_factor())?;
        let mut nodes = Vec::with_capacity(self.nodes.len() + 1);
        nodes.extend_from_slice(&self.nodes);
        nodes.push(position.child);
        Some(Self {
            nodes,
            quantity,
            weight,
        })
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The most specific node (the leaf once the walk has finished)
    pub fn leaf(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    /// Number of nodes on the path
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn weight(&self) -> Decimal {
        self.weight
    }

    /// Nodes from most specific to least specific
    pub fn most_specific_first(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().rev().copied()
    }

    /// Preference between two paths to the same leaf.
    ///
    /// Deeper paths win; equal depths compare node ids from the leaf end
    /// toward the root and the greater sequence wins.
    pub fn preference(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.most_specific_first().cmp(other.most_specific_first()))
    }
}
