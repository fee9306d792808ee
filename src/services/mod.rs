//! Services - analytics logic
//!
//! This module contains the core dwell analytics services:
//! - `geo` - Flat-plane distance and degree/meter projection
//! - `dwell_extractor` - Greedy stationary-period detection per visitor
//! - `alignment` - Raw GPS ↔ floor-plan coordinate alignment
//! - `grid` - Mergeable spatial grid accumulators
//! - `zone_stats` - Per-zone counts, dwell averages, coverage and track quality
//! - `pipeline` - Request orchestration over warehouse and offsets

pub mod alignment;
pub mod dwell_extractor;
pub mod geo;
pub mod grid;
pub mod pipeline;
pub mod zone_stats;

// Re-export commonly used types
pub use alignment::Alignment;
pub use dwell_extractor::{DwellExtractor, ExtractionStats};
pub use geo::Projection;
pub use pipeline::{AnalyticsPipeline, Analysis, DwellRequest, PipelineError};
