//! In-memory snapshot store

use super::traits::{AttributeStore, GraphStore, StorageResult};
use crate::model::{AttributeRecord, Node, NodeId, NodeKind, Position};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// An immutable-after-build snapshot implementing both collaborator traits.
///
/// Built with the `with_*` methods, then shared read-only (typically in an
/// `Arc`) by resolvers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: HashMap<NodeId, NodeKind>,
    outgoing: HashMap<NodeId, Vec<Position>>,
    /// (node, category) -> record date -> record
    records: HashMap<(NodeId, String), BTreeMap<NaiveDate, AttributeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.add_position(position);
        self
    }

    pub fn with_record(mut self, record: AttributeRecord) -> Self {
        self.add_record(record);
        self
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node.kind);
    }

    /// Add a position. Self-loops are ignored.
    pub fn add_position(&mut self, position: Position) {
        if position.parent == position.child {
            return;
        }
        self.outgoing.entry(position.parent).or_default().push(position);
    }

    /// Add a record, replacing any record for the same (node, category, date)
    pub fn add_record(&mut self, record: AttributeRecord) {
        self.records
            .entry((record.node, record.category.clone()))
            .or_default()
            .insert(record.as_of, record);
    }
}

impl GraphStore for MemoryStore {
    fn edges_from(&self, node: NodeId, as_of: NaiveDate) -> StorageResult<Vec<Position>> {
        Ok(self
            .outgoing
            .get(&node)
            .map(|positions| {
                positions
                    .iter()
                    .filter(|p| p.is_valid_at(as_of))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn node_kind(&self, node: NodeId) -> StorageResult<Option<NodeKind>> {
        Ok(self.nodes.get(&node).cloned())
    }
}

impl AttributeStore for MemoryStore {
    fn lookup(
        &self,
        node: NodeId,
        category: &str,
        as_of: NaiveDate,
    ) -> StorageResult<Option<AttributeRecord>> {
        Ok(self
            .records
            .get(&(node, category.to_string()))
            .and_then(|by_date| by_date.range(..=as_of).next_back())
            .map(|(_, record)| record.clone()))
    }
}
