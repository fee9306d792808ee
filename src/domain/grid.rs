//! Aggregated grid results returned to callers

use serde::Serialize;

/// Bounding box over emitted cell centres
///
/// All-zero when there are no cells.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounds over (x, y) points; the zero box for an empty iterator
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let Some((x, y)) = iter.next() else {
            return Self::default();
        };
        iter.fold(Self { min_x: x, max_x: x, min_y: y, max_y: y }, |b, (x, y)| Self {
            min_x: b.min_x.min(x),
            max_x: b.max_x.max(x),
            min_y: b.min_y.min(y),
            max_y: b.max_y.max(y),
        })
    }
}

/// One dwell heatmap cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellCell {
    pub x: f64,
    pub y: f64,
    pub total_dwell_seconds: i64,
    pub avg_dwell_seconds: f64,
    pub visit_count: u64,
    pub unique_visitor_count: u64,
}

/// Dwell heatmap for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellGrid {
    pub cells: Vec<DwellCell>,
    /// Cell edge in meters
    pub grid_size: f64,
    pub bounds: Bounds,
    pub total_dwell_time: i64,
    pub avg_dwell_time: f64,
}

impl DwellGrid {
    pub fn empty(grid_size: f64) -> Self {
        Self {
            cells: Vec::new(),
            grid_size,
            bounds: Bounds::default(),
            total_dwell_time: 0,
            avg_dwell_time: 0.0,
        }
    }
}

/// One raw-track density cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCell {
    pub x: f64,
    pub y: f64,
    pub track_count: u64,
    pub unique_visitor_count: u64,
    /// track_count normalised to 0..=1 against the densest cell
    pub intensity: f64,
}

/// Raw-track heatmap for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackHeatmap {
    pub cells: Vec<TrackCell>,
    pub grid_size: f64,
    pub bounds: Bounds,
    pub total_tracks: u64,
    pub total_unique_visitors: u64,
}
