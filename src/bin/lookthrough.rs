//! Lookthrough CLI — resolve or aggregate holdings from a SQLite snapshot.
//!
//! Usage:
//!   lookthrough holdings --db path --config engine.yaml --root 1 --as-of 2024-06-30 --category risk
//!   lookthrough aggregate ... --group-by risk.region --price pricing.price --min-count 5
//!   lookthrough run query.json --db path --config engine.yaml
//!
//! Results are printed to stdout as JSON lines; logs go to stderr.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use lookthrough::{
    Aggregator, CancellationToken, EngineConfig, FieldSelector, GroupOrder, Having, HoldingsQuery, HoldingsResolver,
    Measure, NodeId, OpenStore, SqliteStore,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lookthrough",
    version,
    about = "Resolve inherited attributes for holdings in an ownership hierarchy"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Abort the query after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Path to SQLite database file
    #[arg(long)]
    db: PathBuf,
    /// Path to YAML engine configuration
    #[arg(long)]
    config: PathBuf,
}

#[derive(Args)]
struct QueryArgs {
    /// Root node id (repeatable)
    #[arg(long = "root", required = true)]
    roots: Vec<i64>,
    /// As-of date (YYYY-MM-DD)
    #[arg(long)]
    as_of: NaiveDate,
    /// Maximum path length in nodes (configured default if omitted)
    #[arg(long)]
    max_depth: Option<usize>,
    /// Category to resolve (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
}

impl QueryArgs {
    fn to_query(&self) -> HoldingsQuery {
        HoldingsQuery {
            roots: self.roots.iter().copied().map(NodeId::new).collect(),
            as_of: self.as_of,
            max_depth: self.max_depth,
            categories: self.categories.clone(),
            group_by: None,
            having: None,
        }
    }
}

#[derive(Args)]
struct AggregateArgs {
    /// Numeric field multiplied by quantity for the total value (e.g. pricing.price)
    #[arg(long)]
    price: Option<FieldSelector>,
    /// Percentile reported per measure, in [0, 1]
    #[arg(long, default_value_t = 0.5)]
    percentile: f64,
    /// Number of concurrent resolution workers
    #[arg(long, default_value_t = 1)]
    partitions: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one resolved holding per leaf
    Holdings {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Group resolved holdings and print summaries
    Aggregate {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        aggregate: AggregateArgs,
        /// Field to group by (repeatable, e.g. risk.region)
        #[arg(long = "group-by", required = true)]
        group_by: Vec<FieldSelector>,
        /// Drop groups with fewer holdings
        #[arg(long)]
        min_count: Option<usize>,
        /// Drop groups worth less than this (needs --price)
        #[arg(long)]
        min_total_value: Option<f64>,
    },
    /// Run a JSON query file; aggregates when it has `group_by`
    Run {
        /// Path to the query JSON
        query: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        aggregate: AggregateArgs,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_resolver(store: &StoreArgs, timeout: Option<u64>) -> Result<HoldingsResolver, String> {
    let config = EngineConfig::from_path(&store.config)
        .map_err(|e| format!("Failed to load config {}: {}", store.config.display(), e))?;
    let db = SqliteStore::open(&store.db).map_err(|e| format!("Failed to open database: {}", e))?;
    let resolver = HoldingsResolver::with_store(Arc::new(db), config);

    let categories = &resolver.config().categories;
    if categories.is_empty() {
        tracing::warn!("configuration declares no categories");
    }
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    tracing::debug!(count = categories.len(), categories = ?names, "configuration loaded");

    Ok(match timeout {
        Some(secs) => {
            let token = CancellationToken::with_timeout(Duration::from_secs(secs));
            tracing::debug!(budget = ?token.remaining(), "query deadline set");
            resolver.with_cancellation(token)
        }
        None => resolver,
    })
}

fn print_line(value: &impl serde::Serialize) -> Result<(), String> {
    let line = serde_json::to_string(value).map_err(|e| e.to_string())?;
    println!("{}", line);
    Ok(())
}

fn cmd_holdings(resolver: &HoldingsResolver, query: &HoldingsQuery) -> Result<(), String> {
    let mut holdings = resolver.resolve_holdings(query).map_err(|e| e.to_string())?;
    let plan = holdings.plan();
    tracing::debug!(
        roots = plan.roots.len(),
        max_depth = plan.max_depth,
        categories = plan.categories.len(),
        "resolving holdings"
    );
    for holding in holdings.by_ref() {
        print_line(&holding.map_err(|e| e.to_string())?)?;
    }
    let metadata = holdings.metadata();
    if metadata.walk.depth_truncated > 0 {
        tracing::warn!(
            truncated = metadata.walk.depth_truncated,
            "some branches exceeded max_depth and were dropped"
        );
    }
    Ok(())
}

/// The group total is only a value when a price field is given; without
/// one, groups are ordered by size and value thresholds are refused.
fn build_aggregator(group_by: Vec<FieldSelector>, having: &Having, args: &AggregateArgs) -> Result<Aggregator, String> {
    let aggregator = Aggregator::new(group_by).percentile(args.percentile);
    let aggregator = match &args.price {
        Some(price) => aggregator.measure(Measure::Value { price: price.clone() }),
        None if having.min_total_value.is_some() => {
            return Err("--min-total-value requires --price".to_string());
        }
        None => aggregator.order(GroupOrder::CountDesc),
    };
    Ok(aggregator.measure(Measure::Quantity))
}

fn cmd_aggregate(
    resolver: &HoldingsResolver,
    query: &HoldingsQuery,
    group_by: Vec<FieldSelector>,
    having: &Having,
    args: &AggregateArgs,
) -> Result<(), String> {
    let aggregator = build_aggregator(group_by, having, args)?;
    let query = query.clone().group_by(aggregator.group_by().to_vec());
    let groups = if args.partitions > 1 {
        let runtime = tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))?;
        let (groups, _) = runtime
            .block_on(aggregator.aggregate_partitioned(resolver, &query, args.partitions, having))
            .map_err(|e| e.to_string())?;
        groups
    } else {
        let holdings = resolver.resolve_holdings(&query).map_err(|e| e.to_string())?;
        aggregator.aggregate(holdings, having).map_err(|e| e.to_string())?
    };

    for group in &groups {
        let key: serde_json::Map<String, serde_json::Value> = aggregator
            .group_by()
            .iter()
            .zip(&group.key)
            .map(|(selector, value)| (selector.to_string(), json!(value)))
            .collect();
        print_line(&json!({
            "key": key,
            "count": group.count,
            "total_value": args.price.as_ref().map(|_| group.total_value()),
            "measures": group.measures,
        }))?;
    }
    Ok(())
}

fn cmd_run(
    query_path: &PathBuf,
    store: &StoreArgs,
    args: &AggregateArgs,
    timeout: Option<u64>,
) -> Result<(), String> {
    let text = std::fs::read_to_string(query_path)
        .map_err(|e| format!("cannot read '{}': {}", query_path.display(), e))?;
    let query: HoldingsQuery = serde_json::from_str(&text).map_err(|e| format!("invalid query: {}", e))?;
    let resolver = open_resolver(store, timeout)?;
    match query.group_by.clone() {
        Some(group_by) => {
            let having = query.having.clone().unwrap_or_default();
            cmd_aggregate(&resolver, &query, group_by, &having, args)
        }
        None => cmd_holdings(&resolver, &query),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let timeout = cli.timeout;
    let result = match cli.command {
        Commands::Holdings { store, query } => {
            open_resolver(&store, timeout).and_then(|resolver| cmd_holdings(&resolver, &query.to_query()))
        }
        Commands::Aggregate {
            store,
            query,
            aggregate,
            group_by,
            min_count,
            min_total_value,
        } => {
            let having = Having {
                min_count,
                min_total_value,
            };
            open_resolver(&store, timeout).and_then(|resolver| {
                cmd_aggregate(&resolver, &query.to_query(), group_by, &having, &aggregate)
            })
        }
        Commands::Run {
            query,
            store,
            aggregate,
        } => cmd_run(&query, &store, &aggregate, timeout),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(price: Option<&str>) -> AggregateArgs {
        AggregateArgs {
            price: price.map(|p| p.parse().unwrap()),
            percentile: 0.5,
            partitions: 1,
        }
    }

    fn region() -> Vec<FieldSelector> {
        vec![FieldSelector::new("risk", "region")]
    }

    #[test]
    fn test_value_threshold_without_price_is_refused() {
        let having = Having {
            min_count: None,
            min_total_value: Some(1000.0),
        };
        let err = build_aggregator(region(), &having, &args(None)).unwrap_err();
        assert!(err.contains("--price"), "{}", err);
    }

    #[test]
    fn test_value_threshold_with_price_is_accepted() {
        let having = Having {
            min_count: Some(2),
            min_total_value: Some(1000.0),
        };
        let aggregator = build_aggregator(region(), &having, &args(Some("pricing.price"))).unwrap();
        assert_eq!(aggregator.group_by(), region().as_slice());
    }

    #[test]
    fn test_count_threshold_needs_no_price() {
        let having = Having {
            min_count: Some(2),
            min_total_value: None,
        };
        assert!(build_aggregator(region(), &having, &args(None)).is_ok());
    }
}
