//! Shared fixtures for integration tests
//!
//! `Fixture` builds a `MemoryStore` snapshot with terse helpers; all
//! positions and records take effect on `since()`.

#![allow(dead_code)]

use chrono::NaiveDate;
use lookthrough::{
    AttributeRecord, AttributeValue, CategoryDescriptor, EngineConfig, HoldingsResolver, Limits,
    MemoryStore, Node, NodeKind, Position,
};
use rust_decimal::Decimal;
use std::sync::Arc;

pub fn since() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
}

/// risk (region, sector), portfolio-scoped strategy, leaf-only price
pub fn engine_config() -> EngineConfig {
    EngineConfig::new(
        Limits::default(),
        vec![
            CategoryDescriptor::new("risk").inheritable("region").inheritable("sector"),
            CategoryDescriptor::new("portfolio")
                .inheritable("strategy")
                .scoped_to([NodeKind::Portfolio]),
            CategoryDescriptor::new("pricing").leaf_only("price"),
        ],
    )
    .unwrap()
}

#[derive(Default)]
pub struct Fixture {
    pub store: MemoryStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn portfolio(mut self, id: i64) -> Self {
        self.store.add_node(Node::new(id, NodeKind::Portfolio));
        self
    }

    pub fn equity(mut self, id: i64) -> Self {
        self.store.add_node(Node::new(id, NodeKind::Equity));
        self
    }

    pub fn hold(mut self, parent: i64, child: i64, quantity: i64) -> Self {
        self.store
            .add_position(Position::new(parent, child, since()).with_quantity(Decimal::from(quantity)));
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.store.add_position(position);
        self
    }

    pub fn attr(mut self, node: i64, category: &str, field: &str, value: impl Into<AttributeValue>) -> Self {
        self.store
            .add_record(AttributeRecord::new(node, category, since()).with_field(field, value));
        self
    }

    /// Several fields of one category on one node, as a single record
    pub fn record(mut self, node: i64, category: &str, fields: &[(&str, AttributeValue)]) -> Self {
        let mut record = AttributeRecord::new(node, category, since());
        for (name, value) in fields {
            record = record.with_field(*name, value.clone());
        }
        self.store.add_record(record);
        self
    }

    pub fn resolver(self) -> HoldingsResolver {
        HoldingsResolver::with_store(Arc::new(self.store), engine_config())
    }
}
