//! Ownership positions: the temporal edges of the graph

use super::node::NodeId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A directed ownership edge: `parent` holds `quantity` units of `child`.
///
/// Valid over the half-open interval `[effective_from, effective_to)`;
/// `effective_to = None` means open-ended. Several positions may target
/// the same child concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub parent: NodeId,
    pub child: NodeId,
    pub quantity: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

impl Position {
    /// Create an open-ended position with no quantity or weight
    pub fn new(parent: impl Into<NodeId>, child: impl Into<NodeId>, effective_from: NaiveDate) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            quantity: None,
            weight: None,
            effective_from,
            effective_to: None,
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_weight(mut self, weight: Decimal) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn until(mut self, effective_to: NaiveDate) -> Self {
        self.effective_to = Some(effective_to);
        self
    }

    /// Whether the validity interval contains `as_of`
    pub fn is_valid_at(&self, as_of: NaiveDate) -> bool {
        self.effective_from <= as_of && self.effective_to.map_or(true, |to| as_of < to)
    }

    /// Edge quantity, with a missing value acting as the multiplicative identity
    pub fn quantity_factor(&self) -> Decimal {
        self.quantity.unwrap_or(Decimal::ONE)
    }

    pub fn weight_factor(&self) -> Decimal {
        self.weight.unwrap_or(Decimal::ONE)
    }
}
