//! Nearest-defined-ancestor resolution along a single path

use super::types::{QueryError, QueryResult};
use crate::model::{CategoryDescriptor, FieldPolicy, FieldValues, LeafPath, NodeId, NodeKind};
use crate::storage::{AttributeStore, GraphStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// One category resolved for one path
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedCategory {
    /// Inheritable fields; every declared field is present, `None` if undefined
    pub inherited: FieldValues,
    /// Leaf-only fields, read from the leaf's own record
    pub leaf_only: FieldValues,
    /// The node each bound value came from
    pub sources: BTreeMap<String, NodeId>,
}

/// Resolves category fields by scanning a path from its most specific node
/// toward the root.
pub struct PathResolver<'a, G: ?Sized, A: ?Sized> {
    graph: &'a G,
    attributes: &'a A,
}

impl<'a, G, A> PathResolver<'a, G, A>
where
    G: GraphStore + ?Sized,
    A: AttributeStore + ?Sized,
{
    pub fn new(graph: &'a G, attributes: &'a A) -> Self {
        Self { graph, attributes }
    }

    /// Node kinds along `path`, root first
    pub fn kinds(&self, path: &LeafPath) -> QueryResult<Vec<NodeKind>> {
        path.nodes()
            .iter()
            .map(|node| {
                self.graph
                    .node_kind(*node)?
                    .ok_or(QueryError::NodeNotFound(*node))
            })
            .collect()
    }

    /// Resolve one category for `path`.
    ///
    /// Node kinds are only fetched when the category is scoped.
    pub fn resolve(
        &self,
        path: &LeafPath,
        category: &CategoryDescriptor,
        as_of: NaiveDate,
    ) -> QueryResult<ResolvedCategory> {
        let kinds = match category.scope {
            Some(_) => Some(self.kinds(path)?),
            None => None,
        };
        self.resolve_with_kinds(path, kinds.as_deref(), category, as_of)
    }

    /// Resolve one category given the kinds along `path` (root first).
    ///
    /// `kinds` may be `None` only for unscoped categories.
    pub fn resolve_with_kinds(
        &self,
        path: &LeafPath,
        kinds: Option<&[NodeKind]>,
        category: &CategoryDescriptor,
        as_of: NaiveDate,
    ) -> QueryResult<ResolvedCategory> {
        let mut resolved = ResolvedCategory::default();
        for field in category.fields_with(FieldPolicy::Inheritable) {
            resolved.inherited.insert(field.name.clone(), None);
        }
        for field in category.fields_with(FieldPolicy::LeafOnly) {
            resolved.leaf_only.insert(field.name.clone(), None);
        }
        if path.is_empty() {
            return Ok(resolved);
        }

        let mut unbound = resolved.inherited.len();
        let has_leaf_only = !resolved.leaf_only.is_empty();
        let leaf_index = path.len() - 1;

        for (index, node) in path.nodes().iter().enumerate().rev() {
            let is_leaf = index == leaf_index;
            if unbound == 0 && !(is_leaf && has_leaf_only) {
                break;
            }

            if category.scope.is_some() {
                let kind = kinds
                    .and_then(|k| k.get(index))
                    .ok_or(QueryError::NodeNotFound(*node))?;
                if !category.admits(kind) {
                    continue;
                }
            }

            let Some(record) = self.attributes.lookup(*node, &category.name, as_of)? else {
                continue;
            };

            if is_leaf {
                for (name, slot) in resolved.leaf_only.iter_mut() {
                    if let Some(value) = record.defined(name) {
                        *slot = Some(value.clone());
                        resolved.sources.insert(name.clone(), *node);
                    }
                }
            }

            for (name, slot) in resolved.inherited.iter_mut() {
                if slot.is_some() {
                    continue;
                }
                if let Some(value) = record.defined(name) {
                    *slot = Some(value.clone());
                    resolved.sources.insert(name.clone(), *node);
                    unbound -= 1;
                }
            }
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeRecord, AttributeValue, Node, Position};
    use crate::storage::MemoryStore;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn path(ids: &[i64]) -> LeafPath {
        let mut p = LeafPath::root(NodeId::new(ids[0]));
        for pair in ids.windows(2) {
            p = p.extend(&Position::new(pair[0], pair[1], date())).unwrap();
        }
        p
    }

    fn record(node: i64, category: &str) -> AttributeRecord {
        AttributeRecord::new(node, category, date())
    }

    fn text(s: &str) -> Option<AttributeValue> {
        Some(AttributeValue::from(s))
    }

    fn risk() -> CategoryDescriptor {
        CategoryDescriptor::new("risk").inheritable("region").inheritable("sector")
    }

    #[test]
    fn test_node_resolves_its_own_value() {
        let store = MemoryStore::new().with_record(record(1, "risk").with_field("region", "EU"));
        let resolved = PathResolver::new(&store, &store)
            .resolve(&path(&[1]), &risk(), date())
            .unwrap();
        assert_eq!(resolved.inherited["region"], text("EU"));
        assert_eq!(resolved.inherited["sector"], None);
    }

    #[test]
    fn test_parent_value_beats_root_value() {
        let store = MemoryStore::new()
            .with_record(record(1, "risk").with_field("region", "GLOBAL").with_field("sector", "MIXED"))
            .with_record(record(2, "risk").with_field("region", "EU"))
            .with_record(record(3, "risk").with_null("region"));

        let resolved = PathResolver::new(&store, &store)
            .resolve(&path(&[1, 2, 3]), &risk(), date())
            .unwrap();
        assert_eq!(resolved.inherited["region"], text("EU"));
        assert_eq!(resolved.inherited["sector"], text("MIXED"));
        assert_eq!(resolved.sources["region"], NodeId::new(2));
        assert_eq!(resolved.sources["sector"], NodeId::new(1));
    }

    #[test]
    fn test_scope_filter_skips_excluded_kinds() {
        let portfolio = CategoryDescriptor::new("portfolio")
            .inheritable("strategy")
            .scoped_to([NodeKind::Portfolio]);
        let store = MemoryStore::new()
            .with_node(Node::new(1, NodeKind::Portfolio))
            .with_node(Node::new(2, NodeKind::Equity))
            .with_record(record(1, "portfolio").with_field("strategy", "growth"))
            .with_record(record(2, "portfolio").with_field("strategy", "ignored"));

        let resolved = PathResolver::new(&store, &store)
            .resolve(&path(&[1, 2]), &portfolio, date())
            .unwrap();
        assert_eq!(resolved.inherited["strategy"], text("growth"));
    }

    #[test]
    fn test_scoped_category_needs_known_nodes() {
        let scoped = CategoryDescriptor::new("portfolio")
            .inheritable("strategy")
            .scoped_to([NodeKind::Portfolio]);
        let store = MemoryStore::new().with_node(Node::new(1, NodeKind::Portfolio));
        let err = PathResolver::new(&store, &store)
            .resolve(&path(&[1, 2]), &scoped, date())
            .unwrap_err();
        assert!(matches!(err, QueryError::NodeNotFound(n) if n == NodeId::new(2)));
    }

    #[test]
    fn test_leaf_only_fields_are_never_inherited() {
        let pricing = CategoryDescriptor::new("pricing")
            .leaf_only("price")
            .inheritable("currency");
        let store = MemoryStore::new()
            .with_record(record(1, "pricing").with_field("price", 99.0).with_field("currency", "EUR"))
            .with_record(record(3, "pricing").with_field("price", 12.5));

        let resolver = PathResolver::new(&store, &store);

        let priced = resolver.resolve(&path(&[1, 2, 3]), &pricing, date()).unwrap();
        assert_eq!(priced.leaf_only["price"], Some(AttributeValue::from(12.5)));
        assert_eq!(priced.inherited["currency"], text("EUR"));

        let unpriced = resolver.resolve(&path(&[1, 2, 4]), &pricing, date()).unwrap();
        assert_eq!(unpriced.leaf_only["price"], None);
        assert_eq!(unpriced.inherited["currency"], text("EUR"));
    }

    #[test]
    fn test_undefined_everywhere_is_absent_not_error() {
        let store = MemoryStore::new();
        let resolved = PathResolver::new(&store, &store)
            .resolve(&path(&[1, 2]), &risk(), date())
            .unwrap();
        assert!(resolved.inherited.values().all(Option::is_none));
        assert!(resolved.sources.is_empty());
    }
}
