//! Raw GPS ↔ floor-plan coordinate alignment
//!
//! The aligned frame is raw longitude/latitude plus the per-floor offset:
//! `x = lon + offset_x`, `y = lat + offset_y`. One `Alignment` is built per
//! pipeline run and is the only place the offset is applied, so nothing is
//! shifted twice. The inverse is used solely to turn aligned zone rectangles
//! into raw warehouse filters.

use crate::domain::types::{CoordinateOffset, DwellEvent, RawRect, TrackingPing, Zone};

/// A point in the aligned frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPoint {
    pub x: f64,
    pub y: f64,
}

/// A ping moved into the aligned frame
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPing {
    pub ping: TrackingPing,
    pub x: f64,
    pub y: f64,
}

/// Single alignment call site for one (store, floor)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Alignment {
    offset: CoordinateOffset,
}

impl Alignment {
    pub fn new(offset: CoordinateOffset) -> Self {
        Self { offset }
    }

    #[inline]
    pub fn offset(&self) -> CoordinateOffset {
        self.offset
    }

    /// Raw (lat, lon) → aligned (x, y)
    #[inline]
    pub fn align(&self, raw_lat: f64, raw_lon: f64) -> AlignedPoint {
        AlignedPoint { x: raw_lon + self.offset.offset_x, y: raw_lat + self.offset.offset_y }
    }

    pub fn align_ping(&self, ping: TrackingPing) -> AlignedPing {
        let p = self.align(ping.latitude, ping.longitude);
        AlignedPing { ping, x: p.x, y: p.y }
    }

    pub fn align_pings(&self, pings: Vec<TrackingPing>) -> Vec<AlignedPing> {
        pings.into_iter().map(|p| self.align_ping(p)).collect()
    }

    /// Move raw extractor output into the aligned frame
    ///
    /// Takes ownership so an event cannot be aligned twice by accident.
    pub fn align_events(&self, events: Vec<DwellEvent>) -> Vec<DwellEvent> {
        events
            .into_iter()
            .map(|mut e| {
                let p = self.align(e.y, e.x);
                e.x = p.x;
                e.y = p.y;
                e
            })
            .collect()
    }

    /// Aligned zone rectangle → raw filter rectangle (corners normalised)
    pub fn raw_rect(&self, zone: &Zone) -> RawRect {
        RawRect {
            lon_min: zone.min_x() - self.offset.offset_x,
            lon_max: zone.max_x() - self.offset.offset_x,
            lat_min: zone.min_y() - self.offset.offset_y,
            lat_max: zone.max_y() - self.offset.offset_y,
        }
    }
}
