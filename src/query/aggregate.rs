//! Grouping and summary statistics over resolved holdings
//!
//! Groups are keyed by the tuple of resolved values for the selected
//! fields. A null component is a valid key part: nulls group with each
//! other and apart from every non-null value.
//!
//! Per-group state is mergeable so partitions resolved on separate workers
//! can be combined: counts and sums add, mean and M2 combine with Chan's
//! parallel formula (population standard deviation is derived from the
//! combined M2), and the raw value buffers are concatenated and sorted
//! once at finish for exact percentiles.

use super::holdings::{HoldingsMetadata, HoldingsResolver, ResolvedHolding};
use super::types::{HoldingsQuery, QueryError, QueryResult};
use crate::model::{AttributeValue, CategoryDescriptor};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Names a resolved field as `category.field`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldSelector {
    pub category: String,
    pub field: String,
}

impl FieldSelector {
    pub fn new(category: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            field: field.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s.split_once('.') {
            Some((category, field)) if !category.is_empty() && !field.is_empty() => {
                Ok(Self::new(category, field))
            }
            _ => Err(format!("expected 'category.field', got '{}'", s)),
        }
    }

    /// Check that the selector names a field of one of `categories`
    pub fn check(&self, categories: &[CategoryDescriptor]) -> QueryResult<()> {
        let category = categories
            .iter()
            .find(|c| c.name == self.category)
            .ok_or_else(|| QueryError::UnknownCategory(self.category.clone()))?;
        if category.field(&self.field).is_none() {
            return Err(QueryError::UnknownField {
                category: self.category.clone(),
                field: self.field.clone(),
            });
        }
        Ok(())
    }

    pub fn select<'h>(&self, holding: &'h ResolvedHolding) -> Option<&'h AttributeValue> {
        holding.value(&self.category, &self.field)
    }
}

impl FromStr for FieldSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldSelector {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FieldSelector> for String {
    fn from(selector: FieldSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.field)
    }
}

/// A numeric expression evaluated per holding
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    /// Accumulated path quantity
    Quantity,
    /// Accumulated path weight
    Weight,
    /// Quantity times a numeric field (typically a leaf-only price)
    Value { price: FieldSelector },
    /// A numeric field as-is
    Field(FieldSelector),
}

impl Measure {
    pub fn name(&self) -> String {
        match self {
            Measure::Quantity => "quantity".to_string(),
            Measure::Weight => "weight".to_string(),
            Measure::Value { price } => format!("value({})", price),
            Measure::Field(selector) => selector.to_string(),
        }
    }

    /// `None` when an input is null or non-numeric; such holdings are
    /// skipped for this measure but still counted in the group.
    pub fn evaluate(&self, holding: &ResolvedHolding) -> Option<f64> {
        match self {
            Measure::Quantity => holding.quantity.to_f64(),
            Measure::Weight => holding.weight.to_f64(),
            Measure::Value { price } => {
                let price = price.select(holding)?.as_f64()?;
                Some(holding.quantity.to_f64()? * price)
            }
            Measure::Field(selector) => selector.select(holding)?.as_f64(),
        }
    }
}

/// Declarative post-aggregation filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Having {
    #[serde(default)]
    pub min_count: Option<usize>,
    /// Compared against the group's total value (first measure's sum)
    #[serde(default)]
    pub min_total_value: Option<f64>,
}

/// Predicate deciding which groups survive aggregation
pub trait GroupFilter {
    fn admits(&self, group: &GroupSummary) -> bool;
}

impl GroupFilter for Having {
    fn admits(&self, group: &GroupSummary) -> bool {
        self.min_count.map_or(true, |min| group.count >= min)
            && self.min_total_value.map_or(true, |min| group.total_value() >= min)
    }
}

impl<F> GroupFilter for F
where
    F: Fn(&GroupSummary) -> bool,
{
    fn admits(&self, group: &GroupSummary) -> bool {
        self(group)
    }
}

/// Output ordering of groups; ties fall back to ascending key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupOrder {
    #[default]
    TotalValueDesc,
    TotalValueAsc,
    CountDesc,
    Key,
}

/// Statistics for one measure within one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureSummary {
    pub name: String,
    /// Holdings with a non-null value for this measure
    pub count: usize,
    pub sum: f64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Population standard deviation
    pub stddev: Option<f64>,
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Resolved values of the group-by fields, in selector order
    pub key: Vec<Option<AttributeValue>>,
    pub count: usize,
    pub measures: Vec<MeasureSummary>,
}

impl GroupSummary {
    /// Sum of the first measure, or zero without measures
    pub fn total_value(&self) -> f64 {
        self.measures.first().map_or(0.0, |m| m.sum)
    }

    pub fn measure(&self, name: &str) -> Option<&MeasureSummary> {
        self.measures.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
struct MeasureState {
    count: usize,
    sum: f64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    values: Vec<f64>,
}

impl Default for MeasureState {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            values: Vec::new(),
        }
    }
}

impl MeasureState {
    fn add(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self.values.push(x);
    }

    fn merge(&mut self, other: MeasureState) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let (a, b) = (self.count as f64, other.count as f64);
        let n = a + b;
        let delta = other.mean - self.mean;
        self.mean += delta * b / n;
        self.m2 += other.m2 + delta * delta * a * b / n;
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.values.extend(other.values);
    }

    fn finish(mut self, name: String, percentile: f64) -> MeasureSummary {
        if self.count == 0 {
            return MeasureSummary {
                name,
                count: 0,
                sum: 0.0,
                avg: None,
                min: None,
                max: None,
                stddev: None,
                percentile: None,
            };
        }
        self.values.sort_by(f64::total_cmp);
        MeasureSummary {
            name,
            count: self.count,
            sum: self.sum,
            avg: Some(self.sum / self.count as f64),
            min: Some(self.min),
            max: Some(self.max),
            stddev: Some((self.m2.max(0.0) / self.count as f64).sqrt()),
            percentile: interpolate(&self.values, percentile),
        }
    }
}

/// Percentile by linear interpolation between closest ranks over sorted values
pub fn interpolate(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

#[derive(Debug, Clone)]
struct GroupState {
    count: usize,
    measures: Vec<MeasureState>,
}

/// Partial per-group state; merge partitions, then `Aggregator::finish`
#[derive(Debug, Clone, Default)]
pub struct GroupAccumulator {
    groups: BTreeMap<Vec<Option<AttributeValue>>, GroupState>,
    holdings: usize,
}

impl GroupAccumulator {
    pub fn merge(&mut self, other: GroupAccumulator) {
        self.holdings += other.holdings;
        for (key, state) in other.groups {
            match self.groups.get_mut(&key) {
                Some(existing) => {
                    existing.count += state.count;
                    for (mine, theirs) in existing.measures.iter_mut().zip(state.measures) {
                        mine.merge(theirs);
                    }
                }
                None => {
                    self.groups.insert(key, state);
                }
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn holding_count(&self) -> usize {
        self.holdings
    }
}

/// Groups holdings by selected fields and summarizes numeric measures
#[derive(Debug, Clone)]
pub struct Aggregator {
    group_by: Vec<FieldSelector>,
    measures: Vec<Measure>,
    percentile: f64,
    order: GroupOrder,
}

impl Aggregator {
    pub fn new(group_by: Vec<FieldSelector>) -> Self {
        Self {
            group_by,
            measures: Vec::new(),
            percentile: 0.5,
            order: GroupOrder::default(),
        }
    }

    /// Add a measure; the first one added defines the group's total value
    pub fn measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Percentile to report, in `[0, 1]` (default 0.5, the median)
    pub fn percentile(mut self, p: f64) -> Self {
        self.percentile = p.clamp(0.0, 1.0);
        self
    }

    pub fn order(mut self, order: GroupOrder) -> Self {
        self.order = order;
        self
    }

    pub fn group_by(&self) -> &[FieldSelector] {
        &self.group_by
    }

    /// Fold one holding into `acc`
    pub fn add(&self, acc: &mut GroupAccumulator, holding: &ResolvedHolding) {
        let key: Vec<Option<AttributeValue>> = self
            .group_by
            .iter()
            .map(|selector| selector.select(holding).cloned())
            .collect();
        let state = acc.groups.entry(key).or_insert_with(|| GroupState {
            count: 0,
            measures: vec![MeasureState::default(); self.measures.len()],
        });
        state.count += 1;
        for (measure, slot) in self.measures.iter().zip(state.measures.iter_mut()) {
            if let Some(x) = measure.evaluate(holding) {
                slot.add(x);
            }
        }
        acc.holdings += 1;
    }

    /// Fold a holdings stream, stopping at the first error
    pub fn accumulate<I>(&self, holdings: I) -> QueryResult<GroupAccumulator>
    where
        I: IntoIterator<Item = QueryResult<ResolvedHolding>>,
    {
        let mut acc = GroupAccumulator::default();
        for holding in holdings {
            self.add(&mut acc, &holding?);
        }
        Ok(acc)
    }

    /// Summarize every group, apply `having`, and order the survivors
    pub fn finish<H>(&self, acc: GroupAccumulator, having: &H) -> Vec<GroupSummary>
    where
        H: GroupFilter + ?Sized,
    {
        let total_groups = acc.group_count();
        let mut groups: Vec<GroupSummary> = acc
            .groups
            .into_iter()
            .map(|(key, state)| GroupSummary {
                key,
                count: state.count,
                measures: self
                    .measures
                    .iter()
                    .zip(state.measures)
                    .map(|(measure, s)| s.finish(measure.name(), self.percentile))
                    .collect(),
            })
            .filter(|group| having.admits(group))
            .collect();

        groups.sort_by(|a, b| self.compare(a, b));
        debug!(groups = total_groups, kept = groups.len(), "aggregation finished");
        groups
    }

    fn compare(&self, a: &GroupSummary, b: &GroupSummary) -> Ordering {
        let primary = match self.order {
            GroupOrder::TotalValueDesc => b.total_value().total_cmp(&a.total_value()),
            GroupOrder::TotalValueAsc => a.total_value().total_cmp(&b.total_value()),
            GroupOrder::CountDesc => b.count.cmp(&a.count),
            GroupOrder::Key => Ordering::Equal,
        };
        primary.then_with(|| a.key.cmp(&b.key))
    }

    /// Aggregate a holdings stream in one pass
    pub fn aggregate<I, H>(&self, holdings: I, having: &H) -> QueryResult<Vec<GroupSummary>>
    where
        I: IntoIterator<Item = QueryResult<ResolvedHolding>>,
        H: GroupFilter + ?Sized,
    {
        let acc = self.accumulate(holdings)?;
        Ok(self.finish(acc, having))
    }

    /// Resolve and fold partitions of the query's leaves concurrently,
    /// merging the partial accumulators before summarizing.
    pub async fn aggregate_partitioned<H>(
        &self,
        resolver: &HoldingsResolver,
        query: &HoldingsQuery,
        partitions: usize,
        having: &H,
    ) -> QueryResult<(Vec<GroupSummary>, HoldingsMetadata)>
    where
        H: GroupFilter + ?Sized,
    {
        let aggregator = self.clone();
        let (partials, metadata) = resolver
            .map_partitions(query, partitions, move |holdings| aggregator.accumulate(holdings))
            .await?;

        let mut merged = GroupAccumulator::default();
        for partial in partials {
            merged.merge(partial);
        }
        Ok((self.finish(merged, having), metadata))
    }
}
