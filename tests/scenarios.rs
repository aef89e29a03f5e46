//! End-to-end holdings resolution over small fund-of-fund fixtures
//!
//! Each test builds a snapshot in memory, resolves holdings as of
//! 2024-06-30, and checks what every leaf inherits.

mod common;

use chrono::NaiveDate;
use common::{as_of, since, Fixture};
use lookthrough::{
    Aggregator, AttributeRecord, AttributeValue, CancellationToken, FieldSelector, GroupSummary,
    Having, HoldingsQuery, HoldingsResolver, Measure, NodeId, Position, QueryError, QueryResult,
    ResolvedHolding,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

fn resolve(resolver: &HoldingsResolver, query: &HoldingsQuery) -> Vec<ResolvedHolding> {
    resolver
        .resolve_holdings(query)
        .unwrap()
        .collect::<QueryResult<Vec<_>>>()
        .unwrap()
}

fn leaves(holdings: &[ResolvedHolding]) -> Vec<i64> {
    holdings.iter().map(|h| h.leaf.get()).collect()
}

fn text(s: &str) -> AttributeValue {
    AttributeValue::from(s)
}

fn risk_query(roots: &[i64]) -> HoldingsQuery {
    HoldingsQuery::new(roots.iter().copied().map(NodeId::new), as_of()).category("risk")
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn leaf_inherits_from_parent_portfolio() {
    // 1 -> 2 -> 10, region recorded on 2 only
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .hold(1, 2, 1)
        .hold(2, 10, 100)
        .attr(2, "risk", "region", "EU")
        .resolver();

    let holdings = resolve(&resolver, &risk_query(&[1]));
    assert_eq!(leaves(&holdings), vec![10]);
    assert_eq!(holdings[0].value("risk", "region"), Some(&text("EU")));
    assert_eq!(holdings[0].sources["risk"]["region"], NodeId::new(2));
}

#[test]
fn leaf_value_overrides_every_ancestor() {
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .hold(1, 2, 1)
        .hold(2, 10, 1)
        .attr(1, "risk", "region", "Global")
        .attr(2, "risk", "region", "EU")
        .attr(10, "risk", "region", "US")
        .resolver();

    let holdings = resolve(&resolver, &risk_query(&[1]));
    assert_eq!(holdings[0].value("risk", "region"), Some(&text("US")));
    assert_eq!(holdings[0].sources["risk"]["region"], NodeId::new(10));
}

#[test]
fn fields_resolve_independently_along_the_path() {
    // region from the root, sector from the middle fund
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .hold(1, 2, 1)
        .hold(2, 10, 1)
        .attr(1, "risk", "region", "EU")
        .attr(2, "risk", "sector", "Tech")
        .resolver();

    let holding = &resolve(&resolver, &risk_query(&[1]))[0];
    assert_eq!(holding.value("risk", "region"), Some(&text("EU")));
    assert_eq!(holding.value("risk", "sector"), Some(&text("Tech")));
    assert_eq!(holding.sources["risk"]["region"], NodeId::new(1));
    assert_eq!(holding.sources["risk"]["sector"], NodeId::new(2));
}

#[test]
fn leaf_only_fields_are_never_inherited() {
    let resolver = Fixture::new()
        .portfolio(1)
        .equity(10)
        .equity(11)
        .hold(1, 10, 1)
        .hold(1, 11, 1)
        .attr(1, "pricing", "price", 99.0)
        .attr(11, "pricing", "price", 12.5)
        .resolver();

    let query = HoldingsQuery::new([NodeId::new(1)], as_of()).category("pricing");
    let holdings = resolve(&resolver, &query);
    assert_eq!(holdings[0].value("pricing", "price"), None);
    assert_eq!(holdings[1].value("pricing", "price"), Some(&AttributeValue::from(12.5)));
}

#[test]
fn scoped_category_skips_nodes_of_other_kinds() {
    // strategy is portfolio-scoped: the equity's own record is ignored
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .hold(1, 2, 1)
        .hold(2, 10, 1)
        .attr(1, "portfolio", "strategy", "balanced")
        .attr(10, "portfolio", "strategy", "ignored")
        .resolver();

    let query = HoldingsQuery::new([NodeId::new(1)], as_of()).category("portfolio");
    let holding = &resolve(&resolver, &query)[0];
    assert_eq!(holding.value("portfolio", "strategy"), Some(&text("balanced")));
    assert_eq!(holding.sources["portfolio"]["strategy"], NodeId::new(1));
}

#[test]
fn unset_field_resolves_to_null() {
    let resolver = Fixture::new()
        .portfolio(1)
        .equity(10)
        .hold(1, 10, 1)
        .attr(1, "risk", "region", "EU")
        .resolver();

    let holding = &resolve(&resolver, &risk_query(&[1]))[0];
    assert_eq!(holding.attributes["risk"].get("sector"), Some(&None));
    assert_eq!(holding.value("risk", "sector"), None);
}

#[test]
fn latest_record_on_or_before_as_of_wins() {
    let mut fixture = Fixture::new().portfolio(1).equity(10).hold(1, 10, 1);
    fixture.store.add_record(
        AttributeRecord::new(1, "risk", since()).with_field("region", "EU"),
    );
    fixture.store.add_record(
        AttributeRecord::new(1, "risk", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .with_field("region", "APAC"),
    );
    fixture.store.add_record(
        AttributeRecord::new(1, "risk", NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
            .with_field("region", "US"),
    );
    let resolver = fixture.resolver();

    let holding = &resolve(&resolver, &risk_query(&[1]))[0];
    assert_eq!(holding.value("risk", "region"), Some(&text("APAC")));

    let early = HoldingsQuery::new([NodeId::new(1)], NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .category("risk");
    let holding = &resolve(&resolver, &early)[0];
    assert_eq!(holding.value("risk", "region"), Some(&text("EU")));
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn deeper_path_wins_when_leaf_is_reachable_twice() {
    //   1 -> 2 -> 100          (region A)
    //   1 -> 3 -> 4 -> 100     (region B on 4)
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .portfolio(3)
        .portfolio(4)
        .equity(100)
        .hold(1, 2, 1)
        .hold(2, 100, 10)
        .hold(1, 3, 1)
        .hold(3, 4, 1)
        .hold(4, 100, 20)
        .attr(2, "risk", "region", "A")
        .attr(4, "risk", "region", "B")
        .resolver();

    let holdings = resolver.resolve_holdings(&risk_query(&[1])).unwrap();
    let metadata = holdings.metadata();
    let holdings: Vec<_> = holdings.collect::<QueryResult<_>>().unwrap();

    assert_eq!(holdings.len(), 1);
    let holding = &holdings[0];
    assert_eq!(holding.path, [1, 3, 4, 100].map(NodeId::new).to_vec());
    assert_eq!(holding.value("risk", "region"), Some(&text("B")));
    assert_eq!(holding.quantity, Decimal::from(20));
    assert_eq!(metadata.duplicate_paths_discarded, 1);
}

#[test]
fn depth_bound_drops_deep_branches_without_error() {
    //   1 -> 2 -> 3 -> 4
    //   1 -> 5
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .portfolio(3)
        .equity(4)
        .equity(5)
        .hold(1, 2, 1)
        .hold(2, 3, 1)
        .hold(3, 4, 1)
        .hold(1, 5, 1)
        .resolver();

    let shallow = resolver.resolve_holdings(&risk_query(&[1]).max_depth(2)).unwrap();
    assert!(shallow.metadata().walk.depth_truncated > 0);
    let shallow: Vec<_> = shallow.collect::<QueryResult<_>>().unwrap();
    assert_eq!(leaves(&shallow), vec![5]);
    assert!(shallow.iter().all(|h| h.path.len() <= 2));

    let deep = resolve(&resolver, &risk_query(&[1]).max_depth(4));
    assert_eq!(leaves(&deep), vec![4, 5]);
}

#[test]
fn cycles_are_pruned() {
    //   1 -> 2 -> 3 -> 1 (back edge), 3 -> 10
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .portfolio(3)
        .equity(10)
        .hold(1, 2, 1)
        .hold(2, 3, 1)
        .hold(3, 1, 1)
        .hold(3, 10, 1)
        .attr(1, "risk", "region", "EU")
        .resolver();

    let holdings = resolver.resolve_holdings(&risk_query(&[1])).unwrap();
    assert_eq!(holdings.metadata().walk.cycles_pruned, 1);
    let holdings: Vec<_> = holdings.collect::<QueryResult<_>>().unwrap();
    assert_eq!(leaves(&holdings), vec![10]);
    assert_eq!(holdings[0].value("risk", "region"), Some(&text("EU")));
}

#[test]
fn expired_positions_are_invisible() {
    let mid_year = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
    let resolver = Fixture::new()
        .portfolio(1)
        .equity(10)
        .equity(11)
        .hold(1, 10, 1)
        .position(Position::new(1, 11, since()).with_quantity(Decimal::ONE).until(mid_year))
        .resolver();

    assert_eq!(leaves(&resolve(&resolver, &risk_query(&[1]))), vec![10]);

    let early = HoldingsQuery::new([NodeId::new(1)], NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    assert_eq!(leaves(&resolve(&resolver, &early)), vec![10, 11]);
}

#[test]
fn quantities_multiply_along_the_path() {
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .hold(1, 2, 3)
        .hold(2, 10, 250)
        .resolver();

    let holding = &resolve(&resolver, &risk_query(&[1]))[0];
    assert_eq!(holding.quantity, Decimal::from(750));
}

#[test]
fn overlapping_roots_yield_each_leaf_once() {
    let resolver = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .equity(10)
        .equity(11)
        .hold(1, 2, 1)
        .hold(2, 10, 1)
        .hold(1, 11, 1)
        .resolver();

    let holdings = resolve(&resolver, &risk_query(&[2, 1, 2]));
    assert_eq!(leaves(&holdings), vec![10, 11]);
    assert_eq!(holdings[0].path, [1, 2, 10].map(NodeId::new).to_vec());
}

#[test]
fn root_without_positions_is_its_own_leaf() {
    let resolver = Fixture::new()
        .equity(10)
        .attr(10, "risk", "region", "EU")
        .resolver();

    let holdings = resolve(&resolver, &risk_query(&[10]));
    assert_eq!(leaves(&holdings), vec![10]);
    assert_eq!(holdings[0].quantity, Decimal::ONE);
    assert_eq!(holdings[0].value("risk", "region"), Some(&text("EU")));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn invalid_queries_are_rejected_before_walking() {
    let resolver = Fixture::new().portfolio(1).equity(10).hold(1, 10, 1).resolver();

    let cases = [
        HoldingsQuery::new(Vec::<NodeId>::new(), as_of()),
        risk_query(&[1]).max_depth(0),
        risk_query(&[1]).max_depth(1000),
        risk_query(&[1]).category("unknown"),
        risk_query(&[1]).group_by(vec![FieldSelector::new("risk", "colour")]),
        risk_query(&[42]),
    ];
    for query in cases {
        let err = resolver.resolve_holdings(&query).err().unwrap();
        assert!(err.is_invalid_query(), "expected invalid query, got {err}");
    }
}

#[test]
fn group_by_must_name_a_requested_category() {
    let resolver = Fixture::new().portfolio(1).equity(10).hold(1, 10, 1).resolver();
    let query = HoldingsQuery::new([NodeId::new(1)], as_of())
        .group_by(vec![FieldSelector::new("risk", "region")]);
    assert!(matches!(
        resolver.resolve_holdings(&query),
        Err(QueryError::UnknownCategory(name)) if name == "risk"
    ));
}

// ============================================================================
// Aggregation
// ============================================================================

/// (leaf, fund, quantity held by the fund, price)
const BOOK: [(i64, i64, i64, Option<f64>); 12] = [
    (101, 2, 10, Some(5.0)),
    (102, 2, 20, Some(2.5)),
    (103, 2, 5, Some(40.0)),
    (104, 2, 8, Some(12.0)),
    (105, 2, 1, Some(100.0)),
    (106, 2, 50, None),
    (107, 3, 7, Some(3.0)),
    (108, 3, 9, Some(11.0)),
    (109, 3, 2, Some(60.0)),
    (110, 3, 4, Some(8.5)),
    (111, 3, 6, Some(1.0)),
    (112, 4, 30, Some(2.0)),
];

/// Root 1 holds funds 2 (x2), 3 (x1) and 4 (x3). Fund 2 is EU/Tech, fund 3
/// is US/Energy, fund 4 is US and its one holding is Health.
fn book_resolver() -> HoldingsResolver {
    let mut fixture = Fixture::new()
        .portfolio(1)
        .portfolio(2)
        .portfolio(3)
        .portfolio(4)
        .hold(1, 2, 2)
        .hold(1, 3, 1)
        .hold(1, 4, 3)
        .record(2, "risk", &[("region", "EU".into()), ("sector", "Tech".into())])
        .record(3, "risk", &[("region", "US".into()), ("sector", "Energy".into())])
        .attr(4, "risk", "region", "US")
        .attr(112, "risk", "sector", "Health")
        .attr(2, "pricing", "price", 1000.0);
    for (leaf, fund, quantity, price) in BOOK {
        fixture = fixture.equity(leaf).hold(fund, leaf, quantity);
        if let Some(price) = price {
            fixture = fixture.attr(leaf, "pricing", "price", price);
        }
    }
    fixture.resolver()
}

fn fund_factor(fund: i64) -> f64 {
    match fund {
        2 => 2.0,
        3 => 1.0,
        _ => 3.0,
    }
}

fn expected_total(funds: &[i64]) -> f64 {
    BOOK.iter()
        .filter(|(_, fund, _, _)| funds.contains(fund))
        .filter_map(|(_, fund, quantity, price)| Some(fund_factor(*fund) * *quantity as f64 * (*price)?))
        .sum()
}

fn book_query() -> HoldingsQuery {
    HoldingsQuery::new([NodeId::new(1)], as_of())
        .category("risk")
        .category("pricing")
        .group_by(vec![FieldSelector::new("risk", "region"), FieldSelector::new("risk", "sector")])
}

fn book_aggregator() -> Aggregator {
    Aggregator::new(vec![FieldSelector::new("risk", "region"), FieldSelector::new("risk", "sector")])
        .measure(Measure::Value {
            price: FieldSelector::new("pricing", "price"),
        })
        .measure(Measure::Quantity)
}

fn key(region: &str, sector: &str) -> Vec<Option<AttributeValue>> {
    vec![Some(region.into()), Some(sector.into())]
}

fn find<'g>(groups: &'g [GroupSummary], key: &[Option<AttributeValue>]) -> Option<&'g GroupSummary> {
    groups.iter().find(|g| g.key == key)
}

#[test]
fn groups_by_region_and_sector_with_min_count() {
    let resolver = book_resolver();
    let having = Having {
        min_count: Some(5),
        min_total_value: None,
    };
    let holdings = resolver.resolve_holdings(&book_query()).unwrap();
    let groups = book_aggregator().aggregate(holdings, &having).unwrap();

    assert_eq!(groups.len(), 2);
    let tech = find(&groups, &key("EU", "Tech")).unwrap();
    let energy = find(&groups, &key("US", "Energy")).unwrap();
    assert!(find(&groups, &key("US", "Health")).is_none());

    assert_eq!(tech.count, 6);
    assert_eq!(energy.count, 5);
    // 106 is unpriced; the fund's own price is not inherited
    assert_eq!(tech.measures[0].count, 5);
    assert!((tech.total_value() - expected_total(&[2])).abs() < 1e-9);
    assert!((energy.total_value() - expected_total(&[3])).abs() < 1e-9);

    let quantity = tech.measure("quantity").unwrap();
    assert_eq!(quantity.sum, 2.0 * (10 + 20 + 5 + 8 + 1 + 50) as f64);

    // Ordered by total value, largest first
    assert!(groups[0].total_value() >= groups[1].total_value());
}

#[test]
fn group_totals_add_up_to_the_book() {
    let resolver = book_resolver();
    let holdings = resolve(&resolver, &book_query());
    let direct: f64 = holdings
        .iter()
        .filter_map(|h| {
            let price = h.value("pricing", "price")?.as_f64()?;
            Some(price * h.quantity.to_f64()?)
        })
        .sum();

    let groups = book_aggregator()
        .aggregate(holdings.into_iter().map(Ok), &Having::default())
        .unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), 12);

    let grouped: f64 = groups.iter().map(GroupSummary::total_value).sum();
    assert!((grouped - direct).abs() < 1e-9);
    assert!((grouped - expected_total(&[2, 3, 4])).abs() < 1e-9);
}

#[test]
fn min_total_value_filters_small_groups() {
    let resolver = book_resolver();
    let having = Having {
        min_count: None,
        min_total_value: Some(expected_total(&[4]) + 1.0),
    };
    let holdings = resolver.resolve_holdings(&book_query()).unwrap();
    let groups = book_aggregator().aggregate(holdings, &having).unwrap();
    assert!(groups.iter().all(|g| g.key != key("US", "Health")));
}

#[tokio::test]
async fn partitioned_aggregation_matches_single_pass() {
    let resolver = book_resolver();
    let having = Having::default();
    let single = book_aggregator()
        .aggregate(resolver.resolve_holdings(&book_query()).unwrap(), &having)
        .unwrap();

    for partitions in [2, 5, 12, 40] {
        let (parted, metadata) = book_aggregator()
            .aggregate_partitioned(&resolver, &book_query(), partitions, &having)
            .await
            .unwrap();
        assert_eq!(metadata.leaves, 12);
        assert_eq!(parted.len(), single.len());
        for (a, b) in single.iter().zip(&parted) {
            assert_eq!(a.key, b.key);
            assert_eq!(a.count, b.count);
            assert!((a.total_value() - b.total_value()).abs() < 1e-9);
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn expired_time_budget_aborts_the_walk() {
    let resolver = book_resolver().with_cancellation(CancellationToken::with_timeout(Duration::ZERO));
    assert!(matches!(
        resolver.resolve_holdings(&book_query()),
        Err(QueryError::Cancelled)
    ));
}

#[test]
fn cancelling_mid_stream_keeps_earlier_holdings() {
    let token = CancellationToken::new();
    let resolver = book_resolver().with_cancellation(token.clone());
    let mut holdings = resolver.resolve_holdings(&book_query()).unwrap();

    let first: Vec<_> = holdings.by_ref().take(3).collect::<QueryResult<_>>().unwrap();
    assert_eq!(leaves(&first), vec![101, 102, 103]);

    token.cancel();
    assert!(matches!(holdings.next(), Some(Err(QueryError::Cancelled))));
    assert!(holdings.next().is_none());
}
