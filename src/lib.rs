//! Lookthrough: holdings resolution over ownership hierarchies
//!
//! Funds hold funds that hold securities. Attributes (region, sector,
//! strategy, ...) may be recorded at any level and are inherited downward:
//! each leaf takes, per field, the value of its nearest ancestor that
//! defines it.
//!
//! # Core Concepts
//!
//! - **Positions**: temporal parent/child ownership edges, valid over a date interval
//! - **Categories**: named field groups with per-field inheritance policy and an optional node-kind scope
//! - **Leaf paths**: root-to-leaf routes through the graph as of a date, one selected per leaf
//! - **Aggregation**: grouping resolved leaves by inherited attributes
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use lookthrough::{
//!     AttributeRecord, CategoryDescriptor, EngineConfig, HoldingsQuery, HoldingsResolver,
//!     Limits, MemoryStore, Node, NodeId, NodeKind, Position,
//! };
//!
//! let since = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let store = MemoryStore::new()
//!     .with_node(Node::new(1, NodeKind::Portfolio))
//!     .with_node(Node::new(2, NodeKind::Equity))
//!     .with_position(Position::new(1, 2, since))
//!     .with_record(AttributeRecord::new(1, "risk", since).with_field("region", "EU"));
//! let config = EngineConfig::new(
//!     Limits::default(),
//!     vec![CategoryDescriptor::new("risk").inheritable("region")],
//! )
//! .unwrap();
//!
//! let resolver = HoldingsResolver::with_store(Arc::new(store), config);
//! let query = HoldingsQuery::new([NodeId::new(1)], since).category("risk");
//! let holding = resolver.resolve_holdings(&query).unwrap().next().unwrap().unwrap();
//! assert_eq!(holding.value("risk", "region"), Some(&"EU".into()));
//! ```

pub mod cancel;
pub mod config;
mod model;
pub mod query;
pub mod storage;

pub use cancel::CancellationToken;
pub use config::{ConfigError, EngineConfig, Limits};
pub use model::{
    AttributeRecord, AttributeValue, CategoryDescriptor, CategoryRegistry, FieldPolicy, FieldSpec,
    FieldValues, LeafPath, Node, NodeId, NodeKind, Position, ScopeFilter,
};
pub use query::{
    Aggregator, FieldSelector, GroupFilter, GroupOrder, GroupSummary, Having, HierarchyWalker,
    HoldingsMetadata, HoldingsQuery, HoldingsResolver, Measure, PathResolver, QueryError,
    QueryResult, ResolvedHolding, WalkStats,
};
pub use storage::{AttributeStore, GraphStore, MemoryStore, OpenStore, SqliteStore, StorageError, StorageResult};
