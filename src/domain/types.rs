//! Shared types for the dwell analytics engine

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Newtype wrapper for opaque visitor identifiers (warehouse `hash_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(pub String);

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VisitorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Store and floor pair - the unit every request is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreFloor {
    pub store_id: i64,
    pub floor: i32,
}

impl StoreFloor {
    pub fn new(store_id: i64, floor: i32) -> Self {
        Self { store_id, floor }
    }
}

impl std::fmt::Display for StoreFloor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.store_id, self.floor)
    }
}

/// Raw position fix as produced by the warehouse layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingPing {
    #[serde(alias = "hash_id")]
    pub visitor_id: VisitorId,
    /// Epoch seconds
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub uncertainty: i32,
}

impl TrackingPing {
    pub fn new(visitor_id: &str, timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            visitor_id: VisitorId::from(visitor_id),
            timestamp,
            latitude,
            longitude,
            floor: 0,
            uncertainty: 0,
        }
    }

    #[inline]
    fn utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// UTC calendar date of the ping (None for out-of-range timestamps)
    pub fn utc_date(&self) -> Option<NaiveDate> {
        self.utc().map(|t| t.date_naive())
    }

    /// UTC hour of day of the ping
    pub fn utc_hour(&self) -> Option<u32> {
        self.utc().map(|t| t.hour())
    }
}

/// An inferred stationary period of one visitor
///
/// `x` is longitude and `y` is latitude. Both are raw until the pipeline
/// passes the event through its `Alignment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellEvent {
    pub visitor_id: VisitorId,
    pub x: f64,
    pub y: f64,
    pub duration_seconds: i64,
    pub start_time: i64,
    pub end_time: i64,
}

/// Per-floor offset that moves raw GPS into the floor plan's frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinateOffset {
    /// Added to longitude
    pub offset_x: f64,
    /// Added to latitude
    pub offset_y: f64,
}

impl CoordinateOffset {
    pub fn new(offset_x: f64, offset_y: f64) -> Self {
        Self { offset_x, offset_y }
    }
}

/// Analyst-defined rectangle in aligned coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Zone {
    pub fn new(id: i64, name: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { id, name: name.to_string(), x1, y1, x2, y2 }
    }

    /// Zone name, or "Zone <id>" when the zone is unnamed
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Zone {}", self.id)
        } else {
            self.name.clone()
        }
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.x1.min(self.x2)
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x1.max(self.x2)
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.y1.min(self.y2)
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y1.max(self.y2)
    }

    /// Inclusive containment, independent of corner order
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.min_x() <= x && x <= self.max_x() && self.min_y() <= y && y <= self.max_y()
    }
}

/// Rectangle in raw warehouse coordinates, used for server-side filtering
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawRect {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl RawRect {
    #[inline]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.lon_min <= longitude
            && longitude <= self.lon_max
            && self.lat_min <= latitude
            && latitude <= self.lat_max
    }
}

/// Request validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("hour {0} is outside 0..=23")]
    InvalidHour(u32),
    #[error("start date {start} is after end date {end}")]
    InvertedDates { start: NaiveDate, end: NaiveDate },
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvertedDates { start, end });
        }
        Ok(Self { start, end })
    }

    /// Single-day range
    pub fn day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Inclusive hour-of-day window (UTC)
///
/// A window with `start_hour > end_hour` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourRange {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for HourRange {
    fn default() -> Self {
        Self { start_hour: 0, end_hour: 23 }
    }
}

impl HourRange {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, QueryError> {
        for hour in [start_hour, end_hour] {
            if hour > 23 {
                return Err(QueryError::InvalidHour(hour));
            }
        }
        Ok(Self { start_hour, end_hour })
    }

    #[inline]
    pub fn contains(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour <= self.end_hour
    }
}

/// Parameters for pulling pings from the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingQuery {
    pub store_floor: StoreFloor,
    pub dates: DateRange,
    pub hours: HourRange,
}

impl PingQuery {
    pub fn new(store_floor: StoreFloor, dates: DateRange, hours: HourRange) -> Self {
        Self { store_floor, dates, hours }
    }

    /// Whether a ping recorded for `store_id` falls inside this query
    pub fn matches(&self, store_id: i64, ping: &TrackingPing) -> bool {
        if store_id != self.store_floor.store_id || ping.floor != self.store_floor.floor {
            return false;
        }
        match (ping.utc_date(), ping.utc_hour()) {
            (Some(date), Some(hour)) => self.dates.contains(date) && self.hours.contains(hour),
            _ => false,
        }
    }
}

/// Raw per-zone counts, as produced by the warehouse count path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ZoneCounts {
    pub track_count: u64,
    pub unique_visitor_count: u64,
    pub visitor_day_count: u64,
}

/// Per-zone visitor statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStats {
    pub zone_id: i64,
    pub zone_name: String,
    pub track_count: u64,
    pub unique_visitor_count: u64,
    pub visitor_day_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_dwell_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ZoneStats {
    pub fn from_counts(zone: &Zone, counts: ZoneCounts) -> Self {
        Self {
            zone_id: zone.id,
            zone_name: zone.display_name(),
            track_count: counts.track_count,
            unique_visitor_count: counts.unique_visitor_count,
            visitor_day_count: counts.visitor_day_count,
            avg_dwell_seconds: None,
            error: None,
        }
    }

    /// Zeroed stats carrying the failure for one zone
    pub fn failed(zone: &Zone, error: String) -> Self {
        Self { error: Some(error), ..Self::from_counts(zone, ZoneCounts::default()) }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
