//! Attribute values and per-node attribute records

use super::node::NodeId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A typed attribute value.
///
/// Ordering and equality are total so values can key groups: numbers sort
/// before text, and numbers compare with `f64::total_cmp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Number(_) => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl Ord for AttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.total_cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            (AttributeValue::Number(_), AttributeValue::Text(_)) => Ordering::Less,
            (AttributeValue::Text(_), AttributeValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AttributeValue {}

/// Field name to optional value, in field-name order
pub type FieldValues = BTreeMap<String, Option<AttributeValue>>;

/// The record held for one (node, category) as of `as_of`.
///
/// A field may be present with a `None` value; resolution treats that the
/// same as an absent field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub node: NodeId,
    pub category: String,
    pub as_of: NaiveDate,
    pub fields: FieldValues,
}

impl AttributeRecord {
    pub fn new(node: impl Into<NodeId>, category: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            node: node.into(),
            category: category.into(),
            as_of,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.fields.insert(name.into(), Some(value.into()));
        self
    }

    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    /// The non-null value of a field, if defined
    pub fn defined(&self, field: &str) -> Option<&AttributeValue> {
        self.fields.get(field).and_then(|v| v.as_ref())
    }
}
