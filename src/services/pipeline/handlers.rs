//! Request handlers for the AnalyticsPipeline
//!
//! Each handler is one exposed analytics operation. They share the stages
//! in `mod.rs` and differ only in what they build from the aligned data.

use super::{AnalyticsPipeline, Analysis, PipelineError, Run};
use crate::domain::grid::{DwellGrid, TrackHeatmap};
use crate::domain::types::{PingQuery, Zone, ZoneStats};
use crate::services::grid::{aggregate_dwell, aggregate_tracks};
use crate::services::zone_stats::{
    self, attach_dwell, FloorTotals, TrackCompleteness, ZoneCoverage, ZoneTrackQuality,
};
use serde::Serialize;
use tracing::{info, warn};

/// Parameters of a dwell-grid request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DwellRequest {
    pub query: PingQuery,
    pub min_dwell_seconds: i64,
    /// Events longer than this (after clamping) are discarded; 0 disables
    pub max_dwell_seconds: Option<i64>,
    /// Cell edge in meters; the configured grid size when absent
    pub grid_size: Option<f64>,
}

impl DwellRequest {
    pub fn new(query: PingQuery, min_dwell_seconds: i64) -> Self {
        Self { query, min_dwell_seconds, max_dwell_seconds: None, grid_size: None }
    }

    pub fn with_max_dwell(mut self, max_dwell_seconds: i64) -> Self {
        self.max_dwell_seconds = Some(max_dwell_seconds);
        self
    }

    pub fn with_grid_size(mut self, grid_size: f64) -> Self {
        self.grid_size = Some(grid_size);
        self
    }
}

impl AnalyticsPipeline {
    /// Dwell-time heatmap for one floor
    pub async fn compute_dwell_grid(&self, request: &DwellRequest) -> Result<Analysis<DwellGrid>, PipelineError> {
        let run = self.begin("dwell_grid", &request.query);
        let result = self.dwell_grid(&run, request).await;
        self.finish(run, result)
    }

    async fn dwell_grid(&self, run: &Run, request: &DwellRequest) -> Result<DwellGrid, PipelineError> {
        let grid_size = self.grid_size(request.grid_size)?;
        let alignment = self.alignment(run, request.query.store_floor).await?;
        let pings = self.fetch(run, &request.query).await?;
        let events = self.extract(run, pings, request.min_dwell_seconds, request.max_dwell_seconds).await?;
        let events = alignment.align_events(events);

        let grid = aggregate_dwell(&events, grid_size, &self.config.projection());
        info!(
            request_id = %run.request_id,
            cells = %grid.cells.len(),
            total_dwell_time = %grid.total_dwell_time,
            "dwell_grid_built"
        );
        Ok(grid)
    }

    /// Per-zone counts, optionally with average dwell
    ///
    /// Counts come from the warehouse count path with each zone converted
    /// back to raw coordinates. A failing zone gets an `error` and zeroed
    /// counts; the other zones are unaffected.
    pub async fn compute_zone_stats(
        &self,
        query: &PingQuery,
        zones: &[Zone],
        include_dwell: bool,
    ) -> Result<Analysis<Vec<ZoneStats>>, PipelineError> {
        let run = self.begin("zone_stats", query);
        let result = self.zone_stats(&run, query, zones, include_dwell).await;
        self.finish(run, result)
    }

    async fn zone_stats(
        &self,
        run: &Run,
        query: &PingQuery,
        zones: &[Zone],
        include_dwell: bool,
    ) -> Result<Vec<ZoneStats>, PipelineError> {
        if zones.is_empty() {
            return Ok(Vec::new());
        }
        let grid_size = if include_dwell { Some(self.grid_size(None)?) } else { None };
        let alignment = self.alignment(run, query.store_floor).await?;

        let mut stats = Vec::with_capacity(zones.len());
        for zone in zones {
            let rect = alignment.raw_rect(zone);
            match self.warehouse.zone_counts(query, &rect).await {
                Ok(counts) => stats.push(ZoneStats::from_counts(zone, counts)),
                Err(e) => {
                    self.metrics.record_zone_failure();
                    warn!(request_id = %run.request_id, zone_id = %zone.id, error = %e, "zone_count_failed");
                    stats.push(ZoneStats::failed(zone, e.to_string()));
                }
            }
        }

        if let Some(grid_size) = grid_size {
            let pings = self.fetch(run, query).await?;
            let events = self.extract(run, pings, self.config.min_dwell_time(), None).await?;
            let events = alignment.align_events(events);
            let grid = aggregate_dwell(&events, grid_size, &self.config.projection());
            attach_dwell(&mut stats, zones, &grid);
        }

        let failed = stats.iter().filter(|s| s.is_failed()).count();
        info!(request_id = %run.request_id, zones = %stats.len(), failed = %failed, "zone_stats_built");
        Ok(stats)
    }

    /// Raw track density heatmap
    pub async fn compute_heatmap(
        &self,
        query: &PingQuery,
        grid_size: Option<f64>,
    ) -> Result<Analysis<TrackHeatmap>, PipelineError> {
        let run = self.begin("heatmap", query);
        let result = self.heatmap(&run, query, grid_size).await;
        self.finish(run, result)
    }

    async fn heatmap(&self, run: &Run, query: &PingQuery, grid_size: Option<f64>) -> Result<TrackHeatmap, PipelineError> {
        let grid_size = self.grid_size(grid_size)?;
        let alignment = self.alignment(run, query.store_floor).await?;
        let pings = alignment.align_pings(self.fetch(run, query).await?);
        Ok(aggregate_tracks(&pings, grid_size, &self.config.projection()))
    }

    pub async fn compute_zone_coverage(
        &self,
        query: &PingQuery,
        zones: &[Zone],
    ) -> Result<Analysis<ZoneCoverage>, PipelineError> {
        let run = self.begin("zone_coverage", query);
        let result = async {
            let alignment = self.alignment(&run, query.store_floor).await?;
            let pings = alignment.align_pings(self.fetch(&run, query).await?);
            Ok::<_, PipelineError>(zone_stats::zone_coverage(&pings, zones))
        }
        .await;
        self.finish(run, result)
    }

    pub async fn compute_track_completeness(
        &self,
        query: &PingQuery,
        zones: &[Zone],
    ) -> Result<Analysis<TrackCompleteness>, PipelineError> {
        let run = self.begin("track_completeness", query);
        let result = async {
            let alignment = self.alignment(&run, query.store_floor).await?;
            let pings = alignment.align_pings(self.fetch(&run, query).await?);
            Ok::<_, PipelineError>(zone_stats::track_completeness(&pings, zones))
        }
        .await;
        self.finish(run, result)
    }

    /// Entry/exit quality of the tracks through each zone, in zone order
    pub async fn compute_zone_track_quality(
        &self,
        query: &PingQuery,
        zones: &[Zone],
    ) -> Result<Analysis<Vec<ZoneTrackQuality>>, PipelineError> {
        let run = self.begin("zone_track_quality", query);
        let result = async {
            let alignment = self.alignment(&run, query.store_floor).await?;
            let pings = alignment.align_pings(self.fetch(&run, query).await?);
            let quality: Vec<ZoneTrackQuality> =
                zones.iter().map(|zone| zone_stats::zone_track_quality(&pings, zone)).collect();
            info!(request_id = %run.request_id, zones = %quality.len(), "zone_track_quality_built");
            Ok::<_, PipelineError>(quality)
        }
        .await;
        self.finish(run, result)
    }

    /// Unfiltered floor totals
    pub async fn compute_floor_totals(&self, query: &PingQuery) -> Result<Analysis<FloorTotals>, PipelineError> {
        let run = self.begin("floor_totals", query);
        let result = async { Ok::<_, PipelineError>(zone_stats::floor_totals(&self.fetch(&run, query).await?)) }.await;
        self.finish(run, result)
    }
}
