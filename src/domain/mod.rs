//! Domain models - core analytics types
//!
//! This module contains the canonical data types used throughout the system:
//! - `TrackingPing` - a single raw position fix from the warehouse
//! - `DwellEvent` - an inferred stationary period of one visitor
//! - `Zone` - analyst-defined rectangle in aligned coordinates
//! - `DwellGrid` / `TrackHeatmap` - aggregated spatial grids
//! - `ZoneStats` - per-zone visitor statistics

pub mod grid;
pub mod types;

// Re-export commonly used types at module level
pub use grid::{Bounds, DwellCell, DwellGrid, TrackCell, TrackHeatmap};
pub use types::{
    CoordinateOffset, DateRange, DwellEvent, HourRange, PingQuery, QueryError, RawRect,
    StoreFloor, TrackingPing, VisitorId, Zone, ZoneStats,
};
