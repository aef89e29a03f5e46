//! Query input, validation, and engine errors

use super::aggregate::{FieldSelector, Having};
use crate::config::EngineConfig;
use crate::model::{CategoryDescriptor, NodeId};
use crate::storage::StorageError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the resolution engine.
///
/// Cycles and depth truncation are not errors; they are pruned and
/// counted in `WalkStats`.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: no roots given")]
    EmptyRoots,

    #[error("Invalid query: max_depth must be positive")]
    NonPositiveDepth,

    #[error("Invalid query: max_depth {requested} exceeds ceiling {ceiling}")]
    DepthAboveCeiling { requested: usize, ceiling: usize },

    #[error("Invalid query: unknown category '{0}'")]
    UnknownCategory(String),

    #[error("Invalid query: category '{category}' has no field '{field}'")]
    UnknownField { category: String, field: String },

    #[error("Invalid query: root {0} not found")]
    UnknownRoot(NodeId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Quantity or weight overflow on path to {leaf}")]
    QuantityOverflow { leaf: NodeId },

    #[error("Query cancelled")]
    Cancelled,

    #[error("Resolution worker failed: {0}")]
    Worker(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] StorageError),
}

impl QueryError {
    /// Whether the query was rejected before traversal began
    pub fn is_invalid_query(&self) -> bool {
        matches!(
            self,
            QueryError::EmptyRoots
                | QueryError::NonPositiveDepth
                | QueryError::DepthAboveCeiling { .. }
                | QueryError::UnknownCategory(_)
                | QueryError::UnknownField { .. }
                | QueryError::UnknownRoot(_)
        )
    }
}

/// Result type for engine operations
pub type QueryResult<T> = Result<T, QueryError>;

/// A holdings query as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsQuery {
    pub roots: Vec<NodeId>,
    pub as_of: NaiveDate,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Aggregation mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<FieldSelector>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Having>,
}

impl HoldingsQuery {
    pub fn new(roots: impl IntoIterator<Item = NodeId>, as_of: NaiveDate) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            as_of,
            max_depth: None,
            categories: Vec::new(),
            group_by: None,
            having: None,
        }
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn category(mut self, name: impl Into<String>) -> Self {
        self.categories.push(name.into());
        self
    }

    pub fn group_by(mut self, selectors: Vec<FieldSelector>) -> Self {
        self.group_by = Some(selectors);
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    /// Check the query against the configuration and produce a plan.
    ///
    /// Roots are deduplicated and sorted; requested categories keep their
    /// order and duplicates collapse.
    pub fn plan(&self, config: &EngineConfig) -> QueryResult<QueryPlan> {
        if self.roots.is_empty() {
            return Err(QueryError::EmptyRoots);
        }

        let max_depth = self.max_depth.unwrap_or(config.limits.default_max_depth);
        if max_depth == 0 {
            return Err(QueryError::NonPositiveDepth);
        }
        if max_depth > config.limits.max_depth_ceiling {
            return Err(QueryError::DepthAboveCeiling {
                requested: max_depth,
                ceiling: config.limits.max_depth_ceiling,
            });
        }

        let mut categories: Vec<CategoryDescriptor> = Vec::new();
        for name in &self.categories {
            let descriptor = config
                .categories
                .get(name)
                .ok_or_else(|| QueryError::UnknownCategory(name.clone()))?;
            if !categories.iter().any(|c| c.name == descriptor.name) {
                categories.push(descriptor.clone());
            }
        }

        if let Some(selectors) = &self.group_by {
            for selector in selectors {
                selector.check(&categories)?;
            }
        }

        let mut roots = self.roots.clone();
        roots.sort();
        roots.dedup();

        Ok(QueryPlan {
            roots,
            as_of: self.as_of,
            max_depth,
            categories,
        })
    }
}

/// A validated query, ready to walk
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub roots: Vec<NodeId>,
    pub as_of: NaiveDate,
    pub max_depth: usize,
    pub categories: Vec<CategoryDescriptor>,
}
