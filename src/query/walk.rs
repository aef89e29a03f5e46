//! Cycle-safe, depth-bounded ownership walks
//!
//! A walk is an explicit depth-first worklist of owned paths. Each popped
//! path asks the graph store for the as-of-valid positions of its last
//! node: none means the path ends at a leaf and is yielded; otherwise each
//! child not already on the path, and within the depth bound, extends it.

use super::types::{QueryError, QueryResult};
use crate::cancel::CancellationToken;
use crate::model::{LeafPath, NodeId, Position};
use crate::storage::GraphStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Counters describing what a walk pruned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Leaf paths yielded
    pub paths_emitted: usize,
    /// Branches dropped because the child was already on the path
    pub cycles_pruned: usize,
    /// Branches dropped by the depth bound
    pub depth_truncated: usize,
    /// Positions returned by the store but not valid at the as-of date
    pub expired_edges: usize,
}

/// Query for walking the ownership graph from one or more roots
#[derive(Debug, Clone)]
pub struct HierarchyWalker {
    pub roots: Vec<NodeId>,
    pub as_of: NaiveDate,
    /// Maximum number of nodes on any emitted path
    pub max_depth: usize,
    cancel: Option<CancellationToken>,
}

impl HierarchyWalker {
    pub fn new(roots: impl IntoIterator<Item = NodeId>, as_of: NaiveDate) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            as_of,
            max_depth: 10,
            cancel: None,
        }
    }

    /// Set the maximum path length (in nodes)
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start the walk. Nothing is read from the store until the first `next()`.
    pub fn walk<'a, G: GraphStore + ?Sized>(&self, store: &'a G) -> Walk<'a, G> {
        let stack = self.roots.iter().rev().map(|root| LeafPath::root(*root)).collect();
        Walk {
            store,
            as_of: self.as_of,
            max_depth: self.max_depth,
            cancel: self.cancel.clone(),
            stack,
            stats: WalkStats::default(),
            finished: false,
        }
    }
}

/// A lazy sequence of leaf paths.
///
/// Roots are walked in the order given and children in ascending id
/// order, so an unchanged snapshot always yields the same sequence. After
/// an error the iterator is exhausted.
pub struct Walk<'a, G: GraphStore + ?Sized> {
    store: &'a G,
    as_of: NaiveDate,
    max_depth: usize,
    cancel: Option<CancellationToken>,
    stack: Vec<LeafPath>,
    stats: WalkStats,
    finished: bool,
}

impl<'a, G: GraphStore + ?Sized> Walk<'a, G> {
    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    fn fail(&mut self, err: QueryError) -> Option<QueryResult<LeafPath>> {
        self.finished = true;
        self.stack.clear();
        Some(Err(err))
    }

    /// Valid positions of `node`, parallel positions to the same child
    /// folded together, in ascending child order.
    fn children_of(&mut self, node: NodeId) -> QueryResult<Vec<Position>> {
        let mut positions = self.store.edges_from(node, self.as_of)?;
        let before = positions.len();
        positions.retain(|p| p.parent == node && p.is_valid_at(self.as_of));
        self.stats.expired_edges += before - positions.len();
        positions.sort_by_key(|p| p.child);

        let mut folded: Vec<Position> = Vec::with_capacity(positions.len());
        for position in positions {
            match folded.last_mut() {
                Some(last) if last.child == position.child => {
                    let overflow = || QueryError::QuantityOverflow {
                        leaf: position.child,
                    };
                    last.quantity = sum_factors(last.quantity, position.quantity).ok_or_else(overflow)?;
                    last.weight = sum_factors(last.weight, position.weight).ok_or_else(overflow)?;
                }
                _ => folded.push(position),
            }
        }
        Ok(folded)
    }
}

/// Sum two folded edge amounts. A missing side counts as the
/// multiplicative identity, as it would alone; `None` on overflow.
fn sum_factors(a: Option<Decimal>, b: Option<Decimal>) -> Option<Option<Decimal>> {
    match (a, b) {
        (None, None) => Some(None),
        (a, b) => a
            .unwrap_or(Decimal::ONE)
            .checked_add(b.unwrap_or(Decimal::ONE))
            .map(Some),
    }
}

impl<'a, G: GraphStore + ?Sized> Iterator for Walk<'a, G> {
    type Item = QueryResult<LeafPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                warn!(emitted = self.stats.paths_emitted, "walk cancelled");
                return self.fail(QueryError::Cancelled);
            }

            let Some(path) = self.stack.pop() else {
                self.finished = true;
                info!(
                    paths = self.stats.paths_emitted,
                    cycles_pruned = self.stats.cycles_pruned,
                    depth_truncated = self.stats.depth_truncated,
                    "walk complete"
                );
                return None;
            };

            let children = match self.children_of(path.leaf()) {
                Ok(children) => children,
                Err(err) => return self.fail(err),
            };

            if children.is_empty() {
                self.stats.paths_emitted += 1;
                return Some(Ok(path));
            }

            // Reverse so the smallest child id is popped first.
            for position in children.iter().rev() {
                if path.contains(position.child) {
                    self.stats.cycles_pruned += 1;
                    debug!(from = %path.leaf(), to = %position.child, "cycle pruned");
                    continue;
                }
                if path.len() >= self.max_depth {
                    self.stats.depth_truncated += 1;
                    debug!(from = %path.leaf(), to = %position.child, depth = path.len(), "depth bound reached");
                    continue;
                }
                match path.extend(position) {
                    Some(next) => self.stack.push(next),
                    None => {
                        return self.fail(QueryError::QuantityOverflow {
                            leaf: position.child,
                        })
                    }
                }
            }
        }
    }
}
