//! store-dwell - in-store dwell analytics from tracking pings
//!
//! Runs one analytics request against the configured ping source and
//! prints the result as JSON. With `--egress` the result is also appended
//! to the configured JSONL egress file.
//!
//! Usage:
//!   store-dwell dwell --store 7 --floor 0 --start 2024-03-01 --end 2024-03-07
//!   store-dwell zones --store 7 --start 2024-03-01 --zones zones.toml --dwell
//!   store-dwell heatmap --store 7 --start 2024-03-01 --start-hour 9 --end-hour 17
//!   store-dwell --pings other.jsonl quality --store 7 --start 2024-03-01 --zones zones.toml

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use store_dwell::domain::types::{DateRange, HourRange, PingQuery, QueryError, StoreFloor, Zone};
use store_dwell::infra::{Config, Metrics};
use store_dwell::io::{ConfiguredOffsets, PingFileWarehouse, ResultEgress};
use store_dwell::services::{AnalyticsPipeline, Analysis, DwellRequest, PipelineError};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// In-store dwell analytics engine
#[derive(Parser, Debug)]
#[command(name = "store-dwell", version, about)]
struct Args {
    /// Path to TOML configuration file (else CONFIG_FILE, else config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Also append the result to the configured egress file
    #[arg(long)]
    egress: bool,

    /// Ping file to read instead of warehouse.pings_file
    #[arg(long)]
    pings: Option<String>,

    /// Override analysis.partitions
    #[arg(long)]
    partitions: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct QueryArgs {
    #[arg(long)]
    store: i64,
    #[arg(long, default_value_t = 0)]
    floor: i32,
    /// First day (YYYY-MM-DD, UTC)
    #[arg(long)]
    start: NaiveDate,
    /// Last day, inclusive; defaults to --start
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, default_value_t = 0)]
    start_hour: u32,
    #[arg(long, default_value_t = 23)]
    end_hour: u32,
}

impl QueryArgs {
    fn to_query(&self) -> Result<PingQuery, QueryError> {
        let dates = DateRange::new(self.start, self.end.unwrap_or(self.start))?;
        let hours = HourRange::new(self.start_hour, self.end_hour)?;
        Ok(PingQuery::new(StoreFloor::new(self.store, self.floor), dates, hours))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dwell-time grid
    Dwell {
        #[command(flatten)]
        query: QueryArgs,
        /// Minimum dwell in seconds (default from config)
        #[arg(long)]
        min_dwell: Option<i64>,
        /// Drop events longer than this many seconds (0 keeps all)
        #[arg(long)]
        max_dwell: Option<i64>,
        /// Cell edge in meters (default from config)
        #[arg(long)]
        grid_size: Option<f64>,
    },
    /// Raw track density heatmap
    Heatmap {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        grid_size: Option<f64>,
    },
    /// Per-zone visitor statistics
    Zones {
        #[command(flatten)]
        query: QueryArgs,
        /// TOML file with [[zones]] tables
        #[arg(long)]
        zones: PathBuf,
        /// Include average dwell per zone
        #[arg(long)]
        dwell: bool,
    },
    /// Visitors seen in any zone versus none
    Coverage {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        zones: PathBuf,
    },
    /// How many of the zones each visitor passed through
    Completeness {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        zones: PathBuf,
    },
    /// Entry/exit quality of the tracks through each zone
    Quality {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        zones: PathBuf,
    },
    /// Whole-floor track and visitor totals
    Totals {
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(Deserialize)]
struct ZonesFile {
    #[serde(default)]
    zones: Vec<Zone>,
}

fn load_zones(path: &Path) -> anyhow::Result<Vec<Zone>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read zones file {}", path.display()))?;
    let file: ZonesFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse zones file {}", path.display()))?;
    Ok(file.zones)
}

/// The caller owns the timeout; the pipeline never gives up on its own
async fn with_timeout<T>(
    timeout_ms: u64,
    request: impl Future<Output = Result<Analysis<T>, PipelineError>>,
) -> anyhow::Result<Analysis<T>> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), request)
        .await
        .map_err(|_| anyhow!("request timed out after {timeout_ms} ms"))?
        .map_err(Into::into)
}

fn emit<T: Serialize>(kind: &str, analysis: &Analysis<T>, egress: Option<&ResultEgress>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(analysis).context("Failed to serialize result")?);
    if let Some(egress) = egress {
        if !egress.write_result(&analysis.request_id, kind, &analysis.result) {
            return Err(anyhow!("failed to write result to {}", egress.file_path()));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(pings) = &args.pings {
        config = config.with_pings_file(pings);
    }
    if let Some(partitions) = args.partitions {
        config = config.with_partitions(partitions);
    }

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        pings_file = %config.pings_file(),
        grid_size = %config.grid_size(),
        spatial_threshold = %config.spatial_threshold(),
        min_dwell_time = %config.min_dwell_time(),
        partitions = %config.partitions(),
        offsets = %config.offsets().len(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    // Periodic report while a long request runs
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let warehouse = Arc::new(PingFileWarehouse::open(config.pings_file()));
    let offsets = Arc::new(ConfiguredOffsets::new(config.offsets()));
    let timeout_ms = config.fetch_timeout_ms();
    let egress = args.egress.then(|| ResultEgress::new(config.egress_file()));
    let egress = egress.as_ref();
    let pipeline = AnalyticsPipeline::new(config, warehouse, offsets).with_metrics(metrics.clone());

    let outcome = run(&pipeline, args.command, timeout_ms, egress).await;

    reporter.abort();
    metrics.report().log();
    outcome
}

async fn run(
    pipeline: &AnalyticsPipeline,
    command: Command,
    timeout_ms: u64,
    egress: Option<&ResultEgress>,
) -> anyhow::Result<()> {
    match command {
        Command::Dwell { query, min_dwell, max_dwell, grid_size } => {
            let mut request =
                DwellRequest::new(query.to_query()?, min_dwell.unwrap_or(pipeline.config().min_dwell_time()));
            if let Some(max_dwell) = max_dwell {
                request = request.with_max_dwell(max_dwell);
            }
            if let Some(grid_size) = grid_size {
                request = request.with_grid_size(grid_size);
            }
            let analysis = with_timeout(timeout_ms, pipeline.compute_dwell_grid(&request)).await?;
            emit("dwell_grid", &analysis, egress)
        }
        Command::Heatmap { query, grid_size } => {
            let query = query.to_query()?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_heatmap(&query, grid_size)).await?;
            emit("heatmap", &analysis, egress)
        }
        Command::Zones { query, zones, dwell } => {
            let query = query.to_query()?;
            let zones = load_zones(&zones)?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_zone_stats(&query, &zones, dwell)).await?;
            emit("zone_stats", &analysis, egress)
        }
        Command::Coverage { query, zones } => {
            let query = query.to_query()?;
            let zones = load_zones(&zones)?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_zone_coverage(&query, &zones)).await?;
            emit("zone_coverage", &analysis, egress)
        }
        Command::Completeness { query, zones } => {
            let query = query.to_query()?;
            let zones = load_zones(&zones)?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_track_completeness(&query, &zones)).await?;
            emit("track_completeness", &analysis, egress)
        }
        Command::Quality { query, zones } => {
            let query = query.to_query()?;
            let zones = load_zones(&zones)?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_zone_track_quality(&query, &zones)).await?;
            emit("zone_track_quality", &analysis, egress)
        }
        Command::Totals { query } => {
            let query = query.to_query()?;
            let analysis = with_timeout(timeout_ms, pipeline.compute_floor_totals(&query)).await?;
            emit("floor_totals", &analysis, egress)
        }
    }
}
