//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{CoordinateOffset, StoreFloor};
use crate::services::dwell_extractor::MAX_DWELL_SECONDS;
use crate::services::geo::Projection;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Deployment identifier, carried in logs
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "store-analytics".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Grid cell edge in meters
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    /// Max distance from the running centroid to stay in a cluster (meters)
    #[serde(default = "default_spatial_threshold")]
    pub spatial_threshold: f64,
    /// Default minimum dwell (seconds) when a request does not set one
    #[serde(default = "default_min_dwell_time")]
    pub min_dwell_time: i64,
    /// Reported dwell durations are clamped to this (seconds)
    #[serde(default = "default_max_dwell_cap")]
    pub max_dwell_cap: i64,
    /// Blocking tasks used for per-visitor extraction (1 = inline)
    #[serde(default = "default_partitions")]
    pub partitions: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            spatial_threshold: default_spatial_threshold(),
            min_dwell_time: default_min_dwell_time(),
            max_dwell_cap: default_max_dwell_cap(),
            partitions: default_partitions(),
        }
    }
}

fn default_grid_size() -> f64 {
    1.0
}

fn default_spatial_threshold() -> f64 {
    2.0
}

fn default_min_dwell_time() -> i64 {
    30
}

fn default_max_dwell_cap() -> i64 {
    MAX_DWELL_SECONDS
}

fn default_partitions() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// JSONL ping source (one ping per line)
    #[serde(default = "default_pings_file")]
    pub pings_file: String,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self { pings_file: default_pings_file(), fetch_timeout_ms: default_fetch_timeout_ms() }
    }
}

fn default_pings_file() -> String {
    "pings.jsonl".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for result egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "results.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

/// One `[[offsets]]` entry
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OffsetEntry {
    pub store_id: i64,
    pub floor: i32,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
}

impl OffsetEntry {
    pub fn store_floor(&self) -> StoreFloor {
        StoreFloor::new(self.store_id, self.floor)
    }

    pub fn offset(&self) -> CoordinateOffset {
        CoordinateOffset::new(self.offset_x, self.offset_y)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub offsets: Vec<OffsetEntry>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    grid_size: f64,
    spatial_threshold: f64,
    min_dwell_time: i64,
    max_dwell_cap: i64,
    partitions: usize,
    projection: Projection,
    pings_file: String,
    fetch_timeout_ms: u64,
    egress_file: String,
    metrics_interval_secs: u64,
    offsets: Vec<OffsetEntry>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            grid_size: toml_config.analysis.grid_size,
            spatial_threshold: toml_config.analysis.spatial_threshold,
            min_dwell_time: toml_config.analysis.min_dwell_time,
            max_dwell_cap: toml_config.analysis.max_dwell_cap,
            partitions: toml_config.analysis.partitions.max(1),
            projection: toml_config.projection,
            pings_file: toml_config.warehouse.pings_file,
            fetch_timeout_ms: toml_config.warehouse.fetch_timeout_ms,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            offsets: toml_config.offsets,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn spatial_threshold(&self) -> f64 {
        self.spatial_threshold
    }

    pub fn min_dwell_time(&self) -> i64 {
        self.min_dwell_time
    }

    pub fn max_dwell_cap(&self) -> i64 {
        self.max_dwell_cap
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn pings_file(&self) -> &str {
        &self.pings_file
    }

    pub fn fetch_timeout_ms(&self) -> u64 {
        self.fetch_timeout_ms
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn offsets(&self) -> &[OffsetEntry] {
        &self.offsets
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override extraction partitions
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// Builder method to override the ping source
    pub fn with_pings_file(mut self, path: &str) -> Self {
        self.pings_file = path.to_string();
        self
    }
}
