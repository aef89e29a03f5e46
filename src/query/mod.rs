//! Resolution engine
//!
//! `HierarchyWalker` yields leaf paths, `select` keeps one per leaf,
//! `PathResolver` resolves categories along a path, `HoldingsResolver`
//! ties them together, and `Aggregator` reduces the result.

mod aggregate;
mod holdings;
mod resolve;
mod select;
mod types;
mod walk;

pub use aggregate::{
    interpolate, Aggregator, FieldSelector, GroupAccumulator, GroupFilter, GroupOrder, GroupSummary,
    Having, Measure, MeasureSummary,
};
pub use holdings::{Holdings, HoldingsMetadata, HoldingsResolver, ResolvedHolding};
pub use resolve::{PathResolver, ResolvedCategory};
pub use select::{select_paths, Selection};
pub use types::{HoldingsQuery, QueryError, QueryPlan, QueryResult};
pub use walk::{HierarchyWalker, Walk, WalkStats};
