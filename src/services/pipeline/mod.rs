//! Request pipeline from warehouse pings to analytics results
//!
//! Each request runs:
//! warehouse pings → dwell extractor → alignment → grid / zone statistics
//!
//! The pipeline holds no per-request state. One `Alignment` is resolved per
//! request from the offset source and is the only place offsets are applied.
//! Every request gets a UUIDv7 `request_id` that appears on its log lines
//! and on the returned `Analysis`.

mod handlers;

use crate::domain::types::{DwellEvent, PingQuery, StoreFloor, TrackingPing};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::offsets::{OffsetError, OffsetSource};
use crate::io::warehouse::{Warehouse, WarehouseError};
use crate::services::alignment::Alignment;
use crate::services::dwell_extractor::{group_by_visitor, DwellExtractor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use handlers::DwellRequest;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Offsets(#[from] OffsetError),
    #[error("dwell extraction task failed: {0}")]
    Extraction(#[from] tokio::task::JoinError),
    #[error("grid size must be a positive number of meters, got {0}")]
    InvalidGridSize(f64),
}

/// A result tagged with the request that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis<T> {
    pub request_id: String,
    pub result: T,
}

impl<T> Analysis<T> {
    pub fn into_inner(self) -> T {
        self.result
    }
}

/// Bookkeeping for one in-flight request
pub(crate) struct Run {
    pub(crate) request_id: Uuid,
    op: &'static str,
    started: Instant,
}

/// Dwell analytics over a warehouse and an offset source
pub struct AnalyticsPipeline {
    pub(crate) config: Config,
    pub(crate) warehouse: Arc<dyn Warehouse>,
    pub(crate) offsets: Arc<dyn OffsetSource>,
    pub(crate) metrics: Arc<Metrics>,
}

impl AnalyticsPipeline {
    pub fn new(config: Config, warehouse: Arc<dyn Warehouse>, offsets: Arc<dyn OffsetSource>) -> Self {
        Self { config, warehouse, offsets, metrics: Arc::new(Metrics::new()) }
    }

    /// Share a metrics collector with the caller
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub(crate) fn begin(&self, op: &'static str, query: &PingQuery) -> Run {
        let run = Run { request_id: Uuid::now_v7(), op, started: Instant::now() };
        self.metrics.record_request();
        info!(
            request_id = %run.request_id,
            op = %op,
            store_floor = %query.store_floor,
            start = %query.dates.start,
            end = %query.dates.end,
            start_hour = %query.hours.start_hour,
            end_hour = %query.hours.end_hour,
            "request_started"
        );
        run
    }

    pub(crate) fn finish<T>(&self, run: Run, result: Result<T, PipelineError>) -> Result<Analysis<T>, PipelineError> {
        let elapsed_ms = run.started.elapsed().as_millis() as u64;
        self.metrics.record_request_latency(elapsed_ms);

        match result {
            Ok(result) => {
                info!(request_id = %run.request_id, op = %run.op, elapsed_ms = %elapsed_ms, "request_completed");
                Ok(Analysis { request_id: run.request_id.to_string(), result })
            }
            Err(e) => {
                warn!(
                    request_id = %run.request_id,
                    op = %run.op,
                    elapsed_ms = %elapsed_ms,
                    error = %e,
                    "request_failed"
                );
                Err(e)
            }
        }
    }

    /// Resolve the alignment for a floor; an uncalibrated floor is identity
    pub(crate) async fn alignment(&self, run: &Run, store_floor: StoreFloor) -> Result<Alignment, PipelineError> {
        match self.offsets.offset(store_floor).await? {
            Some(offset) => Ok(Alignment::new(offset)),
            None => {
                debug!(request_id = %run.request_id, store_floor = %store_floor, "offset_missing");
                Ok(Alignment::default())
            }
        }
    }

    pub(crate) async fn fetch(&self, run: &Run, query: &PingQuery) -> Result<Vec<TrackingPing>, PipelineError> {
        match self.warehouse.fetch_pings(query).await {
            Ok(pings) => {
                self.metrics.record_pings(pings.len() as u64);
                debug!(request_id = %run.request_id, pings = %pings.len(), "pings_fetched");
                Ok(pings)
            }
            Err(e) => {
                self.metrics.record_warehouse_failure();
                Err(e.into())
            }
        }
    }

    /// Raw dwell events, clamped then filtered by a positive `max_dwell_seconds`
    pub(crate) async fn extract(
        &self,
        run: &Run,
        pings: Vec<TrackingPing>,
        min_dwell_seconds: i64,
        max_dwell_seconds: Option<i64>,
    ) -> Result<Vec<DwellEvent>, PipelineError> {
        let extractor = DwellExtractor::from_config(&self.config, min_dwell_seconds);
        let tracks = group_by_visitor(pings);
        let (mut events, stats) = extractor.extract_partitioned(tracks, self.config.partitions()).await?;
        self.metrics.record_extraction(&stats);

        // 0 means no upper bound
        if let Some(max) = max_dwell_seconds.filter(|&max| max > 0) {
            events.retain(|e| e.duration_seconds <= max);
        }

        info!(
            request_id = %run.request_id,
            visitors = %stats.visitors,
            pings = %stats.pings,
            emitted = %stats.emitted,
            dropped_short = %stats.dropped_short,
            capped = %stats.capped,
            kept = %events.len(),
            "dwell_extracted"
        );
        Ok(events)
    }

    pub(crate) fn grid_size(&self, requested: Option<f64>) -> Result<f64, PipelineError> {
        let size = requested.unwrap_or_else(|| self.config.grid_size());
        if size.is_finite() && size > 0.0 {
            Ok(size)
        } else {
            Err(PipelineError::InvalidGridSize(size))
        }
    }
}
