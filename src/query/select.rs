//! One path per leaf
//!
//! A leaf reachable through several paths is resolved along exactly one:
//! the deepest, then the greatest when compared from the leaf end toward
//! the root (see `LeafPath::preference`). The choice depends only on the
//! set of paths, never on the order they were discovered in.

use super::types::QueryResult;
use crate::model::{LeafPath, NodeId};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

/// The selected path for every leaf, in ascending leaf id order
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub paths: BTreeMap<NodeId, LeafPath>,
    /// Paths that lost to a preferred path for the same leaf
    pub discarded: usize,
}

impl Selection {
    /// Offer a path; keeps it if it beats the current choice for its leaf
    pub fn offer(&mut self, path: LeafPath) {
        match self.paths.entry(path.leaf()) {
            Entry::Vacant(slot) => {
                slot.insert(path);
            }
            Entry::Occupied(mut slot) => {
                self.discarded += 1;
                if path.preference(slot.get()) == Ordering::Greater {
                    debug!(leaf = %path.leaf(), depth = path.len(), "preferring alternate path");
                    slot.insert(path);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_paths(self) -> Vec<LeafPath> {
        self.paths.into_values().collect()
    }
}

/// Drain a path sequence into one path per leaf, stopping at the first error
pub fn select_paths<I>(paths: I) -> QueryResult<Selection>
where
    I: IntoIterator<Item = QueryResult<LeafPath>>,
{
    let mut selection = Selection::default();
    for path in paths {
        selection.offer(path?);
    }
    Ok(selection)
}
