//! Read interfaces for the graph and attribute collaborators

use crate::model::{AttributeRecord, NodeId, NodeKind, Position};
use chrono::NaiveDate;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decimal parsing error: {0}")]
    Decimal(String),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Read-only access to the ownership graph.
///
/// Implementations must be thread-safe (Send + Sync) so disjoint leaves
/// can be resolved concurrently against the same snapshot.
pub trait GraphStore: Send + Sync {
    /// Positions held by `node` that may be valid at `as_of`.
    ///
    /// Stores may pre-filter by date; callers still check validity.
    fn edges_from(&self, node: NodeId, as_of: NaiveDate) -> StorageResult<Vec<Position>>;

    /// Kind of a node, or `None` if the node is unknown
    fn node_kind(&self, node: NodeId) -> StorageResult<Option<NodeKind>>;
}

/// Read-only access to per-category attribute records
pub trait AttributeStore: Send + Sync {
    /// The record for (node, category) in effect at `as_of`: the one with
    /// the latest record date not after `as_of`.
    fn lookup(
        &self,
        node: NodeId,
        category: &str,
        as_of: NaiveDate,
    ) -> StorageResult<Option<AttributeRecord>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
