//! Store dwell analytics library
//!
//! Turns raw in-store tracking pings into dwell events, grid heatmaps and
//! zone statistics. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
