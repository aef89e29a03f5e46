//! Attribute categories and their inheritance policies

use super::node::NodeKind;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// How a field is resolved along a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Resolved from the nearest ancestor (or the leaf itself) that defines it
    Inheritable,
    /// Read only from the leaf's own record, never inherited
    LeafOnly,
}

/// A field declaration within a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub policy: FieldPolicy,
}

/// Restricts which node kinds may contribute values for a category.
///
/// Nodes of any other kind are skipped entirely during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeFilter(BTreeSet<NodeKind>);

impl ScopeFilter {
    pub fn new(kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    pub fn admits(&self, kind: &NodeKind) -> bool {
        self.0.contains(kind)
    }
}

/// A named group of fields sharing a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeFilter>,
    pub fields: Vec<FieldSpec>,
}

impl CategoryDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: None,
            fields: Vec::new(),
        }
    }

    /// Declare a field resolved from the nearest defining ancestor
    pub fn inheritable(mut self, field: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: field.into(),
            policy: FieldPolicy::Inheritable,
        });
        self
    }

    /// Declare a field read only from the leaf itself
    pub fn leaf_only(mut self, field: impl Into<String>) -> Self {
        self.fields.push(FieldSpec {
            name: field.into(),
            policy: FieldPolicy::LeafOnly,
        });
        self
    }

    /// Only nodes of the given kinds contribute values for this category
    pub fn scoped_to(mut self, kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        self.scope = Some(ScopeFilter::new(kinds));
        self
    }

    /// Whether a node of this kind may contribute values
    pub fn admits(&self, kind: &NodeKind) -> bool {
        self.scope.as_ref().map_or(true, |scope| scope.admits(kind))
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_with(&self, policy: FieldPolicy) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.policy == policy)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("category name must not be empty".into()));
        }
        if self.fields.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "category '{}' declares no fields",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
        }
        if let Some(scope) = &self.scope {
            if scope.0.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' has an empty scope",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// The validated set of categories a resolver knows about
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: Vec<CategoryDescriptor>,
}

impl CategoryRegistry {
    pub fn new(categories: Vec<CategoryDescriptor>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for category in &categories {
            category.validate()?;
            if !names.insert(category.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' declared twice",
                    category.name
                )));
            }
        }
        Ok(Self { categories })
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDescriptor> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDescriptor> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
