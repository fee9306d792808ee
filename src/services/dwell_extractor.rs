//! Dwell-event extraction from raw visitor pings
//!
//! Per visitor, pings are sorted by timestamp and clustered greedily in a
//! single pass. A cluster keeps a running centroid (incremental mean) and
//! accepts the next ping while its distance to the CURRENT centroid is within
//! the spatial threshold (inclusive). The centroid therefore drifts as pings
//! are folded in; clusters can walk. Do not replace this with seed-based
//! thresholding, it moves cluster boundaries.
//!
//! Key behaviors:
//! - Visitors with fewer than 2 pings produce nothing
//! - Clusters are disjoint; the next cluster starts at the first rejected ping
//! - Clusters shorter than `min_dwell_secs` are dropped, never merged
//! - Reported duration is clamped to the dwell cap (1800s); the cap never
//!   splits a cluster

use crate::domain::types::{DwellEvent, TrackingPing, VisitorId};
use crate::infra::config::Config;
use crate::services::geo::Projection;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Hard cap on reported dwell duration (staff / parked-device filter)
pub const MAX_DWELL_SECONDS: i64 = 1800;

/// All pings of one visitor
#[derive(Debug, Clone)]
pub struct VisitorTrack {
    pub visitor_id: VisitorId,
    pub pings: Vec<TrackingPing>,
}

/// Split pings into per-visitor tracks, in order of first appearance
pub fn group_by_visitor(pings: Vec<TrackingPing>) -> Vec<VisitorTrack> {
    let mut index: FxHashMap<VisitorId, usize> = FxHashMap::default();
    let mut tracks: Vec<VisitorTrack> = Vec::new();

    for ping in pings {
        match index.get(&ping.visitor_id) {
            Some(&i) => tracks[i].pings.push(ping),
            None => {
                index.insert(ping.visitor_id.clone(), tracks.len());
                tracks.push(VisitorTrack { visitor_id: ping.visitor_id.clone(), pings: vec![ping] });
            }
        }
    }
    tracks
}

/// A contiguous run of time-ordered pings, `start..end` into the sorted track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub start: usize,
    pub end: usize,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
}

impl Cluster {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Counters for one extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub visitors: u64,
    /// Visitors with fewer than 2 pings
    pub skipped_visitors: u64,
    pub pings: u64,
    pub clusters: u64,
    pub emitted: u64,
    pub dropped_short: u64,
    pub capped: u64,
}

impl ExtractionStats {
    pub fn merge(&mut self, other: &ExtractionStats) {
        self.visitors += other.visitors;
        self.skipped_visitors += other.skipped_visitors;
        self.pings += other.pings;
        self.clusters += other.clusters;
        self.emitted += other.emitted;
        self.dropped_short += other.dropped_short;
        self.capped += other.capped;
    }
}

/// Greedy stationary-period detector
#[derive(Debug, Clone, Copy)]
pub struct DwellExtractor {
    spatial_threshold_m: f64,
    min_dwell_secs: i64,
    dwell_cap_secs: i64,
    projection: Projection,
}

impl DwellExtractor {
    pub fn new(spatial_threshold_m: f64, min_dwell_secs: i64) -> Self {
        Self {
            spatial_threshold_m,
            min_dwell_secs,
            dwell_cap_secs: MAX_DWELL_SECONDS,
            projection: Projection::default(),
        }
    }

    /// Extractor using the configured threshold, cap and projection
    ///
    /// `min_dwell_secs` is per request, so it is passed separately.
    pub fn from_config(config: &Config, min_dwell_secs: i64) -> Self {
        Self {
            spatial_threshold_m: config.spatial_threshold(),
            min_dwell_secs,
            dwell_cap_secs: config.max_dwell_cap(),
            projection: config.projection(),
        }
    }

    #[inline]
    pub fn spatial_threshold_m(&self) -> f64 {
        self.spatial_threshold_m
    }

    #[inline]
    pub fn min_dwell_secs(&self) -> i64 {
        self.min_dwell_secs
    }

    /// Extract dwell events from an unordered ping stream
    pub fn extract(&self, pings: &[TrackingPing]) -> Vec<DwellEvent> {
        self.extract_with_stats(pings).0
    }

    pub fn extract_with_stats(&self, pings: &[TrackingPing]) -> (Vec<DwellEvent>, ExtractionStats) {
        let mut tracks = group_by_visitor(pings.to_vec());
        self.extract_tracks(&mut tracks)
    }

    /// Extract from pre-grouped tracks (sorts each track in place)
    pub fn extract_tracks(&self, tracks: &mut [VisitorTrack]) -> (Vec<DwellEvent>, ExtractionStats) {
        let mut events = Vec::new();
        let mut stats = ExtractionStats::default();
        for track in tracks.iter_mut() {
            self.extract_visitor(track, &mut events, &mut stats);
        }
        debug!(
            visitors = %stats.visitors,
            pings = %stats.pings,
            clusters = %stats.clusters,
            emitted = %stats.emitted,
            dropped_short = %stats.dropped_short,
            "dwell_extracted"
        );
        (events, stats)
    }

    /// Split visitor tracks across `partitions` blocking tasks
    ///
    /// Results are concatenated in track order, so output matches
    /// `extract_tracks` on the same input. `partitions <= 1` runs inline.
    pub async fn extract_partitioned(
        &self,
        mut tracks: Vec<VisitorTrack>,
        partitions: usize,
    ) -> Result<(Vec<DwellEvent>, ExtractionStats), tokio::task::JoinError> {
        if partitions <= 1 || tracks.len() < 2 {
            return Ok(self.extract_tracks(&mut tracks));
        }

        let chunk_len = tracks.len().div_ceil(partitions);
        let mut handles = Vec::with_capacity(partitions);
        while !tracks.is_empty() {
            let rest = tracks.split_off(chunk_len.min(tracks.len()));
            let mut chunk = std::mem::replace(&mut tracks, rest);
            let extractor = *self;
            handles.push(tokio::task::spawn_blocking(move || extractor.extract_tracks(&mut chunk)));
        }

        let mut events = Vec::new();
        let mut stats = ExtractionStats::default();
        for handle in handles {
            let (part_events, part_stats) = handle.await?;
            events.extend(part_events);
            stats.merge(&part_stats);
        }
        Ok((events, stats))
    }

    fn extract_visitor(
        &self,
        track: &mut VisitorTrack,
        events: &mut Vec<DwellEvent>,
        stats: &mut ExtractionStats,
    ) {
        stats.visitors += 1;
        stats.pings += track.pings.len() as u64;

        if track.pings.len() < 2 {
            stats.skipped_visitors += 1;
            return;
        }

        // Stable: equal timestamps keep input order
        track.pings.sort_by_key(|p| p.timestamp);

        for cluster in self.clusters(&track.pings) {
            stats.clusters += 1;

            let start_time = track.pings[cluster.start].timestamp;
            let end_time = track.pings[cluster.end - 1].timestamp;
            let duration = end_time - start_time;

            if duration < self.min_dwell_secs {
                stats.dropped_short += 1;
                continue;
            }
            if duration > self.dwell_cap_secs {
                stats.capped += 1;
            }

            stats.emitted += 1;
            events.push(DwellEvent {
                visitor_id: track.visitor_id.clone(),
                x: cluster.centroid_lon,
                y: cluster.centroid_lat,
                duration_seconds: duration.min(self.dwell_cap_secs),
                start_time,
                end_time,
            });
        }
    }

    /// Partition time-sorted pings into disjoint contiguous clusters
    ///
    /// Every ping belongs to exactly one cluster. Runs in O(n): the outer
    /// loop resumes where the inner loop stopped.
    pub fn clusters(&self, sorted: &[TrackingPing]) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        let mut i = 0;

        while i < sorted.len() {
            let seed = &sorted[i];
            let mut centroid_lat = seed.latitude;
            let mut centroid_lon = seed.longitude;
            let mut count = 1.0_f64;

            let mut j = i + 1;
            while j < sorted.len() {
                let candidate = &sorted[j];
                let dist = self.projection.distance_meters(
                    centroid_lat,
                    centroid_lon,
                    candidate.latitude,
                    candidate.longitude,
                );
                if dist > self.spatial_threshold_m {
                    break;
                }
                centroid_lat = (centroid_lat * count + candidate.latitude) / (count + 1.0);
                centroid_lon = (centroid_lon * count + candidate.longitude) / (count + 1.0);
                count += 1.0;
                j += 1;
            }

            clusters.push(Cluster { start: i, end: j, centroid_lat, centroid_lon });
            i = j;
        }

        clusters
    }
}
