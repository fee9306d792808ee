//! Spatial grid aggregation for dwell events and raw track points
//!
//! Cell sizes are given in meters and converted to degree steps with the
//! local projection. An item at (x, y) lands in cell
//! `(floor(x / lon_step), floor(y / lat_step))`, whose centre is
//! `index * step + step / 2`. Accumulators are plain mergeable maps: fold
//! items in any order, merge partial maps by key union, then `finish`.

use crate::domain::grid::{Bounds, DwellCell, DwellGrid, TrackCell, TrackHeatmap};
use crate::domain::types::{DwellEvent, VisitorId};
use crate::services::alignment::AlignedPing;
use crate::services::geo::Projection;
use rustc_hash::{FxHashMap, FxHashSet};

/// Integer grid index: `col` along x (longitude), `row` along y (latitude)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub col: i64,
    pub row: i64,
}

/// Cell size in meters plus its degree steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    cell_size_m: f64,
    lat_step: f64,
    lon_step: f64,
}

impl GridSpec {
    pub fn new(cell_size_m: f64, projection: &Projection) -> Self {
        let (lat_step, lon_step) = projection.degree_steps(cell_size_m);
        Self { cell_size_m, lat_step, lon_step }
    }

    #[inline]
    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    #[inline]
    pub fn key(&self, x: f64, y: f64) -> CellKey {
        CellKey { col: (x / self.lon_step).floor() as i64, row: (y / self.lat_step).floor() as i64 }
    }

    /// Centre (x, y) of a cell
    #[inline]
    pub fn center(&self, key: CellKey) -> (f64, f64) {
        (
            key.col as f64 * self.lon_step + self.lon_step / 2.0,
            key.row as f64 * self.lat_step + self.lat_step / 2.0,
        )
    }
}

#[derive(Debug, Clone, Default)]
struct DwellAccum {
    total_dwell: i64,
    visit_count: u64,
    visitors: FxHashSet<VisitorId>,
}

/// Cell-keyed dwell accumulator
#[derive(Debug, Clone)]
pub struct DwellGridAccumulator {
    spec: GridSpec,
    cells: FxHashMap<CellKey, DwellAccum>,
}

impl DwellGridAccumulator {
    pub fn new(spec: GridSpec) -> Self {
        Self { spec, cells: FxHashMap::default() }
    }

    pub fn fold(&mut self, event: &DwellEvent) {
        let cell = self.cells.entry(self.spec.key(event.x, event.y)).or_default();
        cell.total_dwell += event.duration_seconds;
        cell.visit_count += 1;
        if !cell.visitors.contains(&event.visitor_id) {
            cell.visitors.insert(event.visitor_id.clone());
        }
    }

    pub fn fold_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a DwellEvent>,
    {
        for event in events {
            self.fold(event);
        }
    }

    /// Key-union merge with additive accumulation
    pub fn merge(&mut self, other: DwellGridAccumulator) {
        debug_assert_eq!(self.spec, other.spec, "merging grids with different cell sizes");
        for (key, theirs) in other.cells {
            let ours = self.cells.entry(key).or_default();
            ours.total_dwell += theirs.total_dwell;
            ours.visit_count += theirs.visit_count;
            ours.visitors.extend(theirs.visitors);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn finish(self) -> DwellGrid {
        let spec = self.spec;
        let mut total_dwell_time = 0i64;
        let mut total_visits = 0u64;

        let cells: Vec<DwellCell> = self
            .cells
            .into_iter()
            .map(|(key, acc)| {
                let (x, y) = spec.center(key);
                total_dwell_time += acc.total_dwell;
                total_visits += acc.visit_count;
                DwellCell {
                    x,
                    y,
                    total_dwell_seconds: acc.total_dwell,
                    avg_dwell_seconds: ratio(acc.total_dwell as f64, acc.visit_count),
                    visit_count: acc.visit_count,
                    unique_visitor_count: acc.visitors.len() as u64,
                }
            })
            .collect();

        DwellGrid {
            bounds: Bounds::from_points(cells.iter().map(|c| (c.x, c.y))),
            cells,
            grid_size: spec.cell_size_m(),
            total_dwell_time,
            avg_dwell_time: ratio(total_dwell_time as f64, total_visits),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TrackAccum {
    track_count: u64,
    visitors: FxHashSet<VisitorId>,
}

/// Cell-keyed raw track accumulator
#[derive(Debug, Clone)]
pub struct TrackGridAccumulator {
    spec: GridSpec,
    cells: FxHashMap<CellKey, TrackAccum>,
}

impl TrackGridAccumulator {
    pub fn new(spec: GridSpec) -> Self {
        Self { spec, cells: FxHashMap::default() }
    }

    pub fn fold(&mut self, x: f64, y: f64, visitor_id: &VisitorId) {
        let cell = self.cells.entry(self.spec.key(x, y)).or_default();
        cell.track_count += 1;
        if !cell.visitors.contains(visitor_id) {
            cell.visitors.insert(visitor_id.clone());
        }
    }

    pub fn merge(&mut self, other: TrackGridAccumulator) {
        debug_assert_eq!(self.spec, other.spec, "merging grids with different cell sizes");
        for (key, theirs) in other.cells {
            let ours = self.cells.entry(key).or_default();
            ours.track_count += theirs.track_count;
            ours.visitors.extend(theirs.visitors);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn finish(self) -> TrackHeatmap {
        let spec = self.spec;
        let mut all_visitors: FxHashSet<VisitorId> = FxHashSet::default();
        let mut total_tracks = 0u64;

        let mut cells: Vec<TrackCell> = self
            .cells
            .into_iter()
            .map(|(key, acc)| {
                let (x, y) = spec.center(key);
                total_tracks += acc.track_count;
                let unique_visitor_count = acc.visitors.len() as u64;
                all_visitors.extend(acc.visitors);
                TrackCell { x, y, track_count: acc.track_count, unique_visitor_count, intensity: 0.0 }
            })
            .collect();
        normalize_intensity(&mut cells, None);

        TrackHeatmap {
            bounds: Bounds::from_points(cells.iter().map(|c| (c.x, c.y))),
            cells,
            grid_size: spec.cell_size_m(),
            total_tracks,
            total_unique_visitors: all_visitors.len() as u64,
        }
    }
}

/// Set `intensity = track_count / max` on every cell
///
/// `max` defaults to the densest cell. A zero max leaves intensities at 0.
pub fn normalize_intensity(cells: &mut [TrackCell], max: Option<u64>) {
    let max = max.unwrap_or_else(|| cells.iter().map(|c| c.track_count).max().unwrap_or(0));
    for cell in cells.iter_mut() {
        cell.intensity = if max == 0 { 0.0 } else { cell.track_count as f64 / max as f64 };
    }
}

/// Aggregate (already aligned) dwell events into a grid
pub fn aggregate_dwell(events: &[DwellEvent], cell_size_m: f64, projection: &Projection) -> DwellGrid {
    let mut acc = DwellGridAccumulator::new(GridSpec::new(cell_size_m, projection));
    acc.fold_all(events);
    acc.finish()
}

/// Aggregate aligned pings into a track density grid
pub fn aggregate_tracks(
    points: &[AlignedPing],
    cell_size_m: f64,
    projection: &Projection,
) -> TrackHeatmap {
    let mut acc = TrackGridAccumulator::new(GridSpec::new(cell_size_m, projection));
    for p in points {
        acc.fold(p.x, p.y, &p.ping.visitor_id);
    }
    acc.finish()
}

/// total / count, 0 when count is 0
#[inline]
fn ratio(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
