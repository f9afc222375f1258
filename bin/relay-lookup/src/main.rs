//! relay-lookup: one-shot registry query against the upstream feed.
//!
//! Fetches the server list once, builds a snapshot and prints the nearest
//! servers to a coordinate (or the servers of one country).
//!
//! ```text
//! relay-lookup --lat 48.85 --long 2.35 --limit 5
//! relay-lookup --file servers.json --country France --json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::{CapabilityFilter, EndpointRecord, RelayRegistry};
use relay_feed::{FeedConfig, HttpFeed, StaticFeed, UpstreamFeed, DEFAULT_FEED_URL};
use relay_sync::{RefreshConfig, RefreshMetrics, RefreshPipeline};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "relay-lookup", about = "Query the relay registry once and exit")]
struct Cli {
    /// Latitude of the query point
    #[arg(long, default_value_t = 51.53, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the query point
    #[arg(long, default_value_t = -0.1854, allow_negative_numbers = true)]
    long: f64,

    /// Maximum number of servers to print
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    limit: i64,

    /// Required capability (repeatable). Defaults to all capabilities.
    #[arg(long = "capability", value_name = "NAME")]
    capabilities: Vec<String>,

    /// Drop the capability requirement entirely
    #[arg(long, conflicts_with = "capabilities")]
    any_capability: bool,

    /// List the servers of a country instead of a nearest lookup
    #[arg(long)]
    country: Option<String>,

    /// Upstream server list URL
    #[arg(long, default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Read the server list from a file instead of the network
    #[arg(long, conflicts_with = "feed_url")]
    file: Option<PathBuf>,

    /// Fetch timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn filter(&self) -> Result<CapabilityFilter> {
        if self.any_capability {
            return Ok(CapabilityFilter::any());
        }
        if self.capabilities.is_empty() {
            return Ok(CapabilityFilter::all());
        }
        Ok(CapabilityFilter::from_names(
            self.capabilities.iter().flat_map(|c| c.split(',')),
        )?)
    }

    async fn feed(&self) -> Result<Arc<dyn UpstreamFeed>> {
        if let Some(path) = &self.file {
            return Ok(Arc::new(StaticFeed::from_file(path).await?));
        }
        let config = FeedConfig {
            url: self.feed_url.clone(),
            timeout: Duration::from_secs(self.timeout),
            ..FeedConfig::default()
        };
        Ok(Arc::new(HttpFeed::new(config)?))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let filter = cli.filter()?;

    let registry = Arc::new(RelayRegistry::new());
    let pipeline = RefreshPipeline::new(
        cli.feed().await?,
        registry.clone(),
        RefreshMetrics::new()?,
        RefreshConfig::default().with_fetch_timeout(Duration::from_secs(cli.timeout)),
    );

    let report = pipeline
        .run_once(&CancellationToken::new())
        .await
        .context("Failed to load the server list")?;
    info!(
        "Loaded {} servers ({} dropped) in {:?}",
        report.record_count, report.dropped, report.duration
    );

    let records = match &cli.country {
        Some(country) => registry.by_country(country).await?,
        None => registry.nearest(cli.lat, cli.long, &filter, cli.limit).await?,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_table(&records);
    }

    Ok(())
}

fn print_table(records: &[EndpointRecord]) {
    if records.is_empty() {
        println!("No matching servers");
        return;
    }
    println!(
        "{:<8} {:<24} {:<28} {:<16} {:>4} {:>10}",
        "ID", "NAME", "DOMAIN", "COUNTRY", "LOAD", "KM"
    );
    for record in records {
        let distance = record
            .distance
            .map(|d| format!("{:.1}", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<24} {:<28} {:<16} {:>4} {:>10}",
            record.id, record.name, record.domain, record.country, record.load, distance
        );
    }
}
