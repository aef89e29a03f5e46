//! Fully resolved holdings: walk, disambiguate, resolve every category
//!
//! The walk and disambiguation run to completion first (a leaf's path
//! cannot be chosen until every path to it is known). Category resolution
//! then streams one leaf at a time, or runs across partitions of leaves on
//! blocking workers.

use super::resolve::PathResolver;
use super::select::{select_paths, Selection};
use super::types::{HoldingsQuery, QueryError, QueryPlan, QueryResult};
use super::walk::{HierarchyWalker, WalkStats};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::model::{AttributeValue, FieldValues, LeafPath, NodeId};
use crate::storage::{AttributeStore, GraphStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// One leaf with every requested category resolved along its selected path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedHolding {
    pub leaf: NodeId,
    pub path: Vec<NodeId>,
    /// Product of edge quantities along the path
    pub quantity: Decimal,
    /// Product of edge weights along the path
    pub weight: Decimal,
    /// category -> inheritable field values
    pub attributes: BTreeMap<String, FieldValues>,
    /// category -> leaf-only field values
    pub leaf_attributes: BTreeMap<String, FieldValues>,
    /// category -> field -> node that supplied the value
    pub sources: BTreeMap<String, BTreeMap<String, NodeId>>,
}

impl ResolvedHolding {
    /// The resolved value of `category.field`, inherited or leaf-only
    pub fn value(&self, category: &str, field: &str) -> Option<&AttributeValue> {
        self.attributes
            .get(category)
            .and_then(|fields| fields.get(field))
            .or_else(|| self.leaf_attributes.get(category).and_then(|fields| fields.get(field)))
            .and_then(|v| v.as_ref())
    }
}

/// What happened on the way to the resolved set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HoldingsMetadata {
    pub walk: WalkStats,
    /// Distinct leaves after disambiguation
    pub leaves: usize,
    /// Extra paths to already-seen leaves that were not selected
    pub duplicate_paths_discarded: usize,
}

/// Combines the walker and the path resolver over shared read-only stores
#[derive(Clone)]
pub struct HoldingsResolver {
    graph: Arc<dyn GraphStore>,
    attributes: Arc<dyn AttributeStore>,
    config: Arc<EngineConfig>,
    cancel: Option<CancellationToken>,
}

impl HoldingsResolver {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        attributes: Arc<dyn AttributeStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            attributes,
            config: Arc::new(config),
            cancel: None,
        }
    }

    /// Use one store for both the graph and the attributes
    pub fn with_store<S>(store: Arc<S>, config: EngineConfig) -> Self
    where
        S: GraphStore + AttributeStore + 'static,
    {
        Self::new(store.clone(), store, config)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Validate `query` and check that every root exists
    pub fn plan(&self, query: &HoldingsQuery) -> QueryResult<QueryPlan> {
        let plan = query.plan(&self.config)?;
        for root in &plan.roots {
            if self.graph.node_kind(*root)?.is_none() {
                return Err(QueryError::UnknownRoot(*root));
            }
        }
        Ok(plan)
    }

    /// Walk from the plan's roots and keep one path per leaf
    pub fn select(&self, plan: &QueryPlan) -> QueryResult<(Selection, HoldingsMetadata)> {
        let mut walker = HierarchyWalker::new(plan.roots.iter().copied(), plan.as_of)
            .max_depth(plan.max_depth);
        if let Some(token) = &self.cancel {
            walker = walker.with_cancellation(token.clone());
        }

        let mut walk = walker.walk(self.graph.as_ref());
        let selection = select_paths(walk.by_ref())?;
        let metadata = HoldingsMetadata {
            walk: walk.stats(),
            leaves: selection.len(),
            duplicate_paths_discarded: selection.discarded,
        };
        info!(
            leaves = metadata.leaves,
            discarded = metadata.duplicate_paths_discarded,
            "leaf paths selected"
        );
        Ok((selection, metadata))
    }

    /// Resolve every requested category for one selected path
    pub fn resolve_path(&self, path: &LeafPath, plan: &QueryPlan) -> QueryResult<ResolvedHolding> {
        let resolver = PathResolver::new(self.graph.as_ref(), self.attributes.as_ref());
        let kinds = if plan.categories.iter().any(|c| c.scope.is_some()) {
            Some(resolver.kinds(path)?)
        } else {
            None
        };

        let mut holding = ResolvedHolding {
            leaf: path.leaf(),
            path: path.nodes().to_vec(),
            quantity: path.quantity(),
            weight: path.weight(),
            attributes: BTreeMap::new(),
            leaf_attributes: BTreeMap::new(),
            sources: BTreeMap::new(),
        };

        for category in &plan.categories {
            let resolved = resolver.resolve_with_kinds(path, kinds.as_deref(), category, plan.as_of)?;
            if !resolved.inherited.is_empty() {
                holding.attributes.insert(category.name.clone(), resolved.inherited);
            }
            if !resolved.leaf_only.is_empty() {
                holding.leaf_attributes.insert(category.name.clone(), resolved.leaf_only);
            }
            if !resolved.sources.is_empty() {
                holding.sources.insert(category.name.clone(), resolved.sources);
            }
        }

        debug!(leaf = %holding.leaf, depth = holding.path.len(), "holding resolved");
        Ok(holding)
    }

    /// Lazily resolve every leaf reachable from the query's roots.
    ///
    /// Validation, the walk, and disambiguation happen before this returns;
    /// category lookups happen as the iterator is consumed.
    pub fn resolve_holdings(&self, query: &HoldingsQuery) -> QueryResult<Holdings<'_>> {
        let plan = self.plan(query)?;
        let (selection, metadata) = self.select(&plan)?;
        Ok(Holdings::new(self, Arc::new(plan), selection.into_paths(), metadata))
    }

    /// Run `work` over disjoint partitions of the selected leaves on
    /// blocking worker tasks. Results come back in partition order, which
    /// is ascending leaf id order.
    pub async fn map_partitions<T, F>(
        &self,
        query: &HoldingsQuery,
        partitions: usize,
        work: F,
    ) -> QueryResult<(Vec<T>, HoldingsMetadata)>
    where
        T: Send + 'static,
        F: Fn(Holdings<'_>) -> QueryResult<T> + Send + Sync + 'static,
    {
        let this = self.clone();
        let query = query.clone();
        let (plan, selection, metadata) = tokio::task::spawn_blocking(move || {
            let plan = this.plan(&query)?;
            let (selection, metadata) = this.select(&plan)?;
            Ok::<_, QueryError>((plan, selection, metadata))
        })
        .await
        .map_err(|e| QueryError::Worker(e.to_string()))??;

        let plan = Arc::new(plan);
        let work = Arc::new(work);
        let paths = selection.into_paths();
        let chunk_size = paths.len().div_ceil(partitions.max(1)).max(1);

        let mut tasks = JoinSet::new();
        let mut remaining = paths.into_iter();
        let mut index = 0;
        loop {
            let chunk: Vec<LeafPath> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let resolver = self.clone();
            let plan = plan.clone();
            let work = work.clone();
            tasks.spawn_blocking(move || {
                let holdings = Holdings::new(&resolver, plan, chunk, HoldingsMetadata::default());
                (index, work(holdings))
            });
            index += 1;
        }

        let mut results: Vec<Option<T>> = (0..index).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (i, result) = joined.map_err(|e| QueryError::Worker(e.to_string()))?;
            results[i] = Some(result?);
        }

        debug!(partitions = index, leaves = metadata.leaves, "partitions resolved");
        Ok((results.into_iter().flatten().collect(), metadata))
    }

    /// Resolve all holdings concurrently across `partitions` workers
    pub async fn resolve_partitioned(
        &self,
        query: &HoldingsQuery,
        partitions: usize,
    ) -> QueryResult<(Vec<ResolvedHolding>, HoldingsMetadata)> {
        let (chunks, metadata) = self
            .map_partitions(query, partitions, |holdings| holdings.collect::<QueryResult<Vec<_>>>())
            .await?;
        Ok((chunks.into_iter().flatten().collect(), metadata))
    }
}

/// A lazy sequence of resolved holdings in ascending leaf id order.
///
/// Checks the resolver's cancellation token before each leaf. After an
/// error the iterator is exhausted.
pub struct Holdings<'a> {
    resolver: &'a HoldingsResolver,
    plan: Arc<QueryPlan>,
    paths: std::vec::IntoIter<LeafPath>,
    metadata: HoldingsMetadata,
    finished: bool,
}

impl<'a> Holdings<'a> {
    fn new(
        resolver: &'a HoldingsResolver,
        plan: Arc<QueryPlan>,
        paths: Vec<LeafPath>,
        metadata: HoldingsMetadata,
    ) -> Self {
        Self {
            resolver,
            plan,
            paths: paths.into_iter(),
            metadata,
            finished: false,
        }
    }

    pub fn metadata(&self) -> HoldingsMetadata {
        self.metadata
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }
}

impl Iterator for Holdings<'_> {
    type Item = QueryResult<ResolvedHolding>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.resolver.is_cancelled() {
            self.finished = true;
            return Some(Err(QueryError::Cancelled));
        }
        let path = self.paths.next()?;
        let result = self.resolver.resolve_path(&path, &self.plan);
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.paths.len()))
    }
}
