//! Local flat-plane distance and degree/meter conversion
//!
//! Stores are small enough to treat as flat. Latitude degrees convert to
//! meters with a fixed constant; longitude degrees additionally scale by
//! cos(local latitude). The default scale 0.566 is cos(55.5°) and must be
//! recalibrated for stores far from that latitude.

use serde::Deserialize;

/// Meters per degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// cos(55.5°)
pub const DEFAULT_LON_SCALE: f64 = 0.566;

/// Degree-to-meter projection for one locality
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Projection {
    #[serde(default = "default_meters_per_degree")]
    pub meters_per_degree: f64,
    #[serde(default = "default_lon_scale")]
    pub lon_scale: f64,
}

fn default_meters_per_degree() -> f64 {
    METERS_PER_DEGREE
}

fn default_lon_scale() -> f64 {
    DEFAULT_LON_SCALE
}

impl Default for Projection {
    fn default() -> Self {
        Self { meters_per_degree: METERS_PER_DEGREE, lon_scale: DEFAULT_LON_SCALE }
    }
}

impl Projection {
    pub fn new(meters_per_degree: f64, lon_scale: f64) -> Self {
        Self { meters_per_degree, lon_scale }
    }

    /// Euclidean distance in meters between two lat/lon points
    #[inline]
    pub fn distance_meters(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let dy = (lat2 - lat1) * self.meters_per_degree;
        let dx = (lon2 - lon1) * self.meters_per_degree * self.lon_scale;
        dx.hypot(dy)
    }

    /// Grid steps in degrees for a cell edge in meters: (lat_step, lon_step)
    #[inline]
    pub fn degree_steps(&self, cell_size_m: f64) -> (f64, f64) {
        let lat_step = cell_size_m / self.meters_per_degree;
        let lon_step = cell_size_m / (self.meters_per_degree * self.lon_scale);
        (lat_step, lon_step)
    }
}

/// Distance in meters using the default projection
#[inline]
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Projection::default().distance_meters(lat1, lon1, lat2, lon2)
}
