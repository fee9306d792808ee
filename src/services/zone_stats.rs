//! Per-zone visitor statistics
//!
//! Every zone is evaluated on its own: a visitor seen in two overlapping
//! zones counts fully in both. Containment is inclusive and corner-order
//! independent (see `Zone::contains`), always in the aligned frame.
//!
//! Average dwell for a zone is taken over grid cells whose CENTRE lies in the
//! zone, not over the underlying events. Cells straddling the zone edge are
//! all-in or all-out.

use crate::domain::grid::{DwellCell, DwellGrid};
use crate::domain::types::{TrackingPing, VisitorId, Zone, ZoneCounts, ZoneStats};
use crate::services::alignment::AlignedPing;
use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Running track / visitor / visitor-day counts for one area
#[derive(Debug, Default)]
pub struct ZoneCounter {
    tracks: u64,
    visitors: FxHashSet<VisitorId>,
    visitor_days: FxHashSet<(VisitorId, NaiveDate)>,
}

impl ZoneCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ping: &TrackingPing) {
        self.tracks += 1;
        if !self.visitors.contains(&ping.visitor_id) {
            self.visitors.insert(ping.visitor_id.clone());
        }
        if let Some(date) = ping.utc_date() {
            self.visitor_days.insert((ping.visitor_id.clone(), date));
        }
    }

    pub fn counts(&self) -> ZoneCounts {
        ZoneCounts {
            track_count: self.tracks,
            unique_visitor_count: self.visitors.len() as u64,
            visitor_day_count: self.visitor_days.len() as u64,
        }
    }
}

/// Σ total_dwell / Σ visit_count over cells centred inside the zone; 0 if none
pub fn zone_avg_dwell(zone: &Zone, cells: &[DwellCell]) -> f64 {
    let (total_dwell, total_visits) = cells
        .iter()
        .filter(|c| zone.contains(c.x, c.y))
        .fold((0i64, 0u64), |(d, v), c| (d + c.total_dwell_seconds, v + c.visit_count));

    if total_visits == 0 {
        0.0
    } else {
        total_dwell as f64 / total_visits as f64
    }
}

/// Fill `avg_dwell_seconds` on every successful zone
///
/// `stats[i]` belongs to `zones[i]`. `grid` and `zones` are both in the
/// aligned frame; no offset is applied.
pub fn attach_dwell(stats: &mut [ZoneStats], zones: &[Zone], grid: &DwellGrid) {
    debug_assert_eq!(stats.len(), zones.len());
    for (stat, zone) in stats.iter_mut().zip(zones) {
        if !stat.is_failed() {
            stat.avg_dwell_seconds = Some(zone_avg_dwell(zone, &grid.cells));
        }
    }
}

/// Visitors inside any zone versus nowhere in a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneCoverage {
    pub total_visitors: u64,
    pub visitors_in_zones: u64,
    pub visitors_outside_zones: u64,
}

pub fn zone_coverage(pings: &[AlignedPing], zones: &[Zone]) -> ZoneCoverage {
    let mut all: FxHashSet<&VisitorId> = FxHashSet::default();
    let mut inside: FxHashSet<&VisitorId> = FxHashSet::default();

    for p in pings {
        all.insert(&p.ping.visitor_id);
        if zones.iter().any(|z| z.contains(p.x, p.y)) {
            inside.insert(&p.ping.visitor_id);
        }
    }

    ZoneCoverage {
        total_visitors: all.len() as u64,
        visitors_in_zones: inside.len() as u64,
        visitors_outside_zones: (all.len() - inside.len()) as u64,
    }
}

/// How many of the given zones each visitor passed through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCompleteness {
    pub total_zones: usize,
    pub total_visitors: u64,
    /// zones visited → number of visitors
    pub distribution: BTreeMap<usize, u64>,
    pub complete_tracks: u64,
    pub complete_pct: f64,
    pub partial_tracks: u64,
    pub partial_pct: f64,
}

/// Zone-visit distribution per visitor
///
/// With no zones there is nothing to complete; the result is empty.
pub fn track_completeness(pings: &[AlignedPing], zones: &[Zone]) -> TrackCompleteness {
    let mut visited: BTreeMap<&VisitorId, FxHashSet<usize>> = BTreeMap::new();

    if !zones.is_empty() {
        for p in pings {
            let entry = visited.entry(&p.ping.visitor_id).or_default();
            for (i, zone) in zones.iter().enumerate() {
                if zone.contains(p.x, p.y) {
                    entry.insert(i);
                }
            }
        }
    }

    let mut distribution: BTreeMap<usize, u64> = BTreeMap::new();
    for zone_set in visited.values() {
        *distribution.entry(zone_set.len()).or_default() += 1;
    }

    let total_zones = zones.len();
    let total_visitors: u64 = distribution.values().sum();
    let complete_tracks = if total_zones == 0 {
        0
    } else {
        distribution.get(&total_zones).copied().unwrap_or(0)
    };
    let partial_tracks: u64 = distribution
        .iter()
        .filter(|(&k, _)| k > 0 && k < total_zones)
        .map(|(_, &v)| v)
        .sum();

    TrackCompleteness {
        total_zones,
        total_visitors,
        complete_pct: pct(complete_tracks, total_visitors),
        partial_pct: pct(partial_tracks, total_visitors),
        distribution,
        complete_tracks,
        partial_tracks,
    }
}

/// Visitors seen in a zone whose track never showed them outside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IncompleteTracks {
    /// Track starts inside the zone
    pub no_entry: u64,
    /// Track ends inside the zone
    pub no_exit: u64,
    /// Only ever seen inside the zone
    pub no_entry_no_exit: u64,
}

/// Entry/exit quality of the tracks passing through one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneTrackQuality {
    pub zone_id: i64,
    pub zone_name: String,
    /// Visitors with at least one ping in the zone
    pub total_visitors: u64,
    pub complete_tracks: u64,
    pub complete_pct: f64,
    pub incomplete_tracks: IncompleteTracks,
}

/// First/last timestamps of one visitor, split by inside/outside the zone
#[derive(Debug, Clone, Copy, Default)]
struct ZoneSpan {
    first_in: Option<i64>,
    last_in: Option<i64>,
    first_out: Option<i64>,
    last_out: Option<i64>,
}

impl ZoneSpan {
    fn add(&mut self, timestamp: i64, inside: bool) {
        let (first, last) = if inside {
            (&mut self.first_in, &mut self.last_in)
        } else {
            (&mut self.first_out, &mut self.last_out)
        };
        *first = Some(first.map_or(timestamp, |t| t.min(timestamp)));
        *last = Some(last.map_or(timestamp, |t| t.max(timestamp)));
    }
}

/// Classify every visitor seen in `zone` by whether the track enters and leaves it
///
/// A visitor has an entry when some ping outside the zone is strictly earlier
/// than their first ping inside it, and an exit when some outside ping is
/// strictly later than their last inside ping.
pub fn zone_track_quality(pings: &[AlignedPing], zone: &Zone) -> ZoneTrackQuality {
    let mut spans: FxHashMap<&VisitorId, ZoneSpan> = FxHashMap::default();
    for p in pings {
        spans.entry(&p.ping.visitor_id).or_default().add(p.ping.timestamp, zone.contains(p.x, p.y));
    }

    let mut total_visitors = 0u64;
    let mut complete_tracks = 0u64;
    let mut incomplete = IncompleteTracks::default();

    for span in spans.values() {
        let (Some(first_in), Some(last_in)) = (span.first_in, span.last_in) else {
            continue;
        };
        total_visitors += 1;
        let has_entry = span.first_out.is_some_and(|t| t < first_in);
        let has_exit = span.last_out.is_some_and(|t| t > last_in);
        match (has_entry, has_exit) {
            (true, true) => complete_tracks += 1,
            (false, true) => incomplete.no_entry += 1,
            (true, false) => incomplete.no_exit += 1,
            (false, false) => incomplete.no_entry_no_exit += 1,
        }
    }

    ZoneTrackQuality {
        zone_id: zone.id,
        zone_name: zone.display_name(),
        total_visitors,
        complete_tracks,
        complete_pct: pct(complete_tracks, total_visitors),
        incomplete_tracks: incomplete,
    }
}

/// Whole-floor totals, for comparing against zone-filtered counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FloorTotals {
    pub total_tracks: u64,
    pub unique_visitors: u64,
    pub visitor_days: u64,
}

pub fn floor_totals(pings: &[TrackingPing]) -> FloorTotals {
    let mut counter = ZoneCounter::new();
    for ping in pings {
        counter.add(ping);
    }
    let counts = counter.counts();
    FloorTotals {
        total_tracks: counts.track_count,
        unique_visitors: counts.unique_visitor_count,
        visitor_days: counts.visitor_day_count,
    }
}

/// Percentage rounded to one decimal, 0 when the total is 0
fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CoordinateOffset;
    use crate::services::alignment::Alignment;

    const DAY: i64 = 86_400;

    fn aligned(pings: Vec<TrackingPing>) -> Vec<AlignedPing> {
        Alignment::default().align_pings(pings)
    }

    fn counts_in(zone: &Zone, pings: &[AlignedPing]) -> ZoneCounts {
        let mut counter = ZoneCounter::new();
        for p in pings.iter().filter(|p| zone.contains(p.x, p.y)) {
            counter.add(&p.ping);
        }
        counter.counts()
    }

    fn cell(x: f64, y: f64, total: i64, visits: u64) -> DwellCell {
        DwellCell {
            x,
            y,
            total_dwell_seconds: total,
            avg_dwell_seconds: total as f64 / visits as f64,
            visit_count: visits,
            unique_visitor_count: visits,
        }
    }

    #[test]
    fn test_zone_counter_tracks_visitors_and_days() {
        let zone = Zone::new(1, "z", 19.0, 9.0, 21.0, 11.0);
        let pings = aligned(vec![
            TrackingPing::new("a", 0, 10.0, 20.0),
            TrackingPing::new("a", 60, 10.0, 20.0),
            TrackingPing::new("a", DAY + 10, 10.0, 20.0),
            TrackingPing::new("b", 30, 10.5, 20.5),
            TrackingPing::new("c", 30, 50.0, 50.0),
        ]);
        let counts = counts_in(&zone, &pings);
        assert_eq!(counts.track_count, 4);
        assert_eq!(counts.unique_visitor_count, 2);
        // a on two days + b on one
        assert_eq!(counts.visitor_day_count, 3);
    }

    #[test]
    fn test_overlapping_zones_count_fully_in_both() {
        let zones = vec![
            Zone::new(1, "left", 19.0, 9.0, 20.5, 11.0),
            Zone::new(2, "right", 19.5, 9.0, 21.0, 11.0),
        ];
        let pings = aligned(vec![TrackingPing::new("a", 0, 10.0, 20.0)]);
        assert_eq!(counts_in(&zones[0], &pings).unique_visitor_count, 1);
        assert_eq!(counts_in(&zones[1], &pings).unique_visitor_count, 1);
    }

    #[test]
    fn test_swapped_corners_same_stats() {
        let zone = Zone::new(1, "z", 19.0, 9.0, 20.0, 10.0);
        let swapped = Zone::new(1, "z", 20.0, 10.0, 19.0, 9.0);
        let pings = aligned(vec![
            TrackingPing::new("a", 0, 10.0, 20.0), // on the corner
            TrackingPing::new("b", 0, 9.5, 19.5),
            TrackingPing::new("c", 0, 10.5, 19.5),
        ]);
        assert_eq!(counts_in(&zone, &pings), counts_in(&swapped, &pings));
        assert_eq!(counts_in(&zone, &pings).track_count, 2);

        let cells = vec![cell(19.5, 9.5, 100, 2)];
        assert_eq!(zone_avg_dwell(&zone, &cells), zone_avg_dwell(&swapped, &cells));
    }

    #[test]
    fn test_zone_avg_dwell_over_contained_cells() {
        let zone = Zone::new(1, "z", 0.0, 0.0, 10.0, 10.0);
        let cells = vec![
            cell(1.0, 1.0, 120, 2),
            cell(9.0, 9.0, 60, 1),
            cell(11.0, 5.0, 10_000, 1), // outside
        ];
        assert_eq!(zone_avg_dwell(&zone, &cells), 60.0);
    }

    #[test]
    fn test_zone_avg_dwell_no_cells_is_zero() {
        let zone = Zone::new(1, "z", 0.0, 0.0, 1.0, 1.0);
        assert_eq!(zone_avg_dwell(&zone, &[]), 0.0);
        assert_eq!(zone_avg_dwell(&zone, &[cell(5.0, 5.0, 60, 1)]), 0.0);
    }

    #[test]
    fn test_attach_dwell_skips_failed_zones() {
        let zones = vec![Zone::new(1, "ok", 0.0, 0.0, 10.0, 10.0), Zone::new(2, "bad", 0.0, 0.0, 10.0, 10.0)];
        let mut stats = vec![
            ZoneStats::from_counts(&zones[0], ZoneCounts::default()),
            ZoneStats::failed(&zones[1], "boom".to_string()),
        ];
        let grid = DwellGrid {
            cells: vec![cell(5.0, 5.0, 90, 3)],
            ..DwellGrid::empty(1.0)
        };
        attach_dwell(&mut stats, &zones, &grid);
        assert_eq!(stats[0].avg_dwell_seconds, Some(30.0));
        assert_eq!(stats[1].avg_dwell_seconds, None);
    }

    #[test]
    fn test_attach_dwell_with_duplicate_zone_ids() {
        let zones = vec![Zone::new(1, "near", 0.0, 0.0, 10.0, 10.0), Zone::new(1, "far", 50.0, 50.0, 60.0, 60.0)];
        let mut stats: Vec<ZoneStats> =
            zones.iter().map(|z| ZoneStats::from_counts(z, ZoneCounts::default())).collect();
        let grid = DwellGrid {
            cells: vec![cell(5.0, 5.0, 90, 3)],
            ..DwellGrid::empty(1.0)
        };
        attach_dwell(&mut stats, &zones, &grid);
        assert_eq!(stats[0].avg_dwell_seconds, Some(30.0));
        assert_eq!(stats[1].avg_dwell_seconds, Some(0.0));
    }

    #[test]
    fn test_zone_track_quality_classifies_entry_and_exit() {
        // zone spans lon 0..1, lat 0..1
        let zone = Zone::new(4, "Entrance", 0.0, 0.0, 1.0, 1.0);
        let pings = aligned(vec![
            // out → in → out
            TrackingPing::new("through", 0, 5.0, 5.0),
            TrackingPing::new("through", 10, 0.5, 0.5),
            TrackingPing::new("through", 20, 5.0, 5.0),
            // starts inside, then leaves
            TrackingPing::new("started", 0, 0.5, 0.5),
            TrackingPing::new("started", 10, 5.0, 5.0),
            // enters and stays
            TrackingPing::new("stayed", 0, 5.0, 5.0),
            TrackingPing::new("stayed", 10, 0.5, 0.5),
            // never outside
            TrackingPing::new("inside", 0, 0.5, 0.5),
            TrackingPing::new("inside", 10, 0.6, 0.6),
            // never inside
            TrackingPing::new("passer", 0, 5.0, 5.0),
        ]);

        let quality = zone_track_quality(&pings, &zone);
        assert_eq!(quality.zone_id, 4);
        assert_eq!(quality.zone_name, "Entrance");
        assert_eq!(quality.total_visitors, 4);
        assert_eq!(quality.complete_tracks, 1);
        assert_eq!(quality.complete_pct, 25.0);
        assert_eq!(
            quality.incomplete_tracks,
            IncompleteTracks { no_entry: 1, no_exit: 1, no_entry_no_exit: 1 }
        );
    }

    #[test]
    fn test_zone_track_quality_uses_timestamps_not_input_order() {
        let zone = Zone::new(1, "", 0.0, 0.0, 1.0, 1.0);
        // delivered newest first; still out → in → out
        let pings = aligned(vec![
            TrackingPing::new("a", 30, 5.0, 5.0),
            TrackingPing::new("a", 20, 0.5, 0.5),
            TrackingPing::new("a", 10, 5.0, 5.0),
        ]);
        let quality = zone_track_quality(&pings, &zone);
        assert_eq!(quality.complete_tracks, 1);
        assert_eq!(quality.zone_name, "Zone 1");
    }

    #[test]
    fn test_zone_track_quality_empty() {
        let zone = Zone::new(1, "z", 0.0, 0.0, 1.0, 1.0);
        let quality = zone_track_quality(&[], &zone);
        assert_eq!(quality.total_visitors, 0);
        assert_eq!(quality.complete_pct, 0.0);
        assert_eq!(quality.incomplete_tracks, IncompleteTracks::default());
    }

    #[test]
    fn test_coverage_uses_aligned_frame() {
        // Zone drawn over the aligned position of the raw point (10, 20)
        let alignment = Alignment::new(CoordinateOffset::new(1.0, 1.0));
        let zones = vec![Zone::new(1, "z", 20.9, 10.9, 21.1, 11.1)];
        let pings = alignment.align_pings(vec![
            TrackingPing::new("a", 0, 10.0, 20.0),
            TrackingPing::new("b", 0, 30.0, 30.0),
        ]);
        let coverage = zone_coverage(&pings, &zones);
        assert_eq!(coverage.total_visitors, 2);
        assert_eq!(coverage.visitors_in_zones, 1);
        assert_eq!(coverage.visitors_outside_zones, 1);
    }

    #[test]
    fn test_track_completeness_distribution() {
        let zones = vec![Zone::new(1, "a", 0.0, 0.0, 1.0, 1.0), Zone::new(2, "b", 2.0, 0.0, 3.0, 1.0)];
        // x = longitude, y = latitude
        let pings = aligned(vec![
            TrackingPing::new("full", 0, 0.5, 0.5),
            TrackingPing::new("full", 1, 0.5, 2.5),
            TrackingPing::new("half", 0, 0.5, 0.5),
            TrackingPing::new("none", 0, 5.0, 5.0),
        ]);
        let result = track_completeness(&pings, &zones);
        assert_eq!(result.total_zones, 2);
        assert_eq!(result.total_visitors, 3);
        assert_eq!(result.distribution.get(&2), Some(&1));
        assert_eq!(result.distribution.get(&1), Some(&1));
        assert_eq!(result.distribution.get(&0), Some(&1));
        assert_eq!(result.complete_tracks, 1);
        assert_eq!(result.complete_pct, 33.3);
        assert_eq!(result.partial_tracks, 1);
        assert_eq!(result.partial_pct, 33.3);
    }

    #[test]
    fn test_track_completeness_without_zones_is_empty() {
        let pings = aligned(vec![TrackingPing::new("a", 0, 0.5, 0.5)]);
        let result = track_completeness(&pings, &[]);
        assert_eq!(result.total_visitors, 0);
        assert_eq!(result.complete_tracks, 0);
        assert_eq!(result.complete_pct, 0.0);
    }

    #[test]
    fn test_floor_totals() {
        let totals = floor_totals(&[
            TrackingPing::new("a", 0, 0.0, 0.0),
            TrackingPing::new("a", DAY, 0.0, 0.0),
            TrackingPing::new("b", 0, 0.0, 0.0),
        ]);
        assert_eq!(totals.total_tracks, 3);
        assert_eq!(totals.unique_visitors, 2);
        assert_eq!(totals.visitor_days, 3);
    }
}
