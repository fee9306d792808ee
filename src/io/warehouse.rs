//! Warehouse interface - where raw pings come from
//!
//! The engine only needs two queries: all pings for a (store, floor,
//! dates, hours) selection, and per-rectangle counts in RAW coordinates.
//! `PingFileWarehouse` serves both from a JSONL file or an in-memory list:
//!
//! ```text
//! {"store_id":7,"hash_id":"a1f3","timestamp":1709299800,"latitude":55.6761,"longitude":12.5683,"floor":0}
//! ```

use crate::domain::types::{PingQuery, RawRect, TrackingPing, ZoneCounts};
use crate::services::zone_stats::ZoneCounter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("failed to read ping source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("warehouse query failed: {0}")]
    Query(String),
}

/// Source of raw tracking pings
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Pings matching the query, in no particular order
    async fn fetch_pings(&self, query: &PingQuery) -> Result<Vec<TrackingPing>, WarehouseError>;

    /// Counts for pings matching the query whose raw position lies in `rect`
    async fn zone_counts(&self, query: &PingQuery, rect: &RawRect) -> Result<ZoneCounts, WarehouseError>;
}

/// One stored ping with its store id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRecord {
    pub store_id: i64,
    #[serde(flatten)]
    pub ping: TrackingPing,
}

impl PingRecord {
    pub fn new(store_id: i64, ping: TrackingPing) -> Self {
        Self { store_id, ping }
    }
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Memory(Vec<PingRecord>),
}

/// JSONL / in-memory warehouse
///
/// The file is re-read on each query so a long-running caller sees appends.
#[derive(Debug, Clone)]
pub struct PingFileWarehouse {
    source: Source,
}

impl PingFileWarehouse {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self { source: Source::File(path.as_ref().to_path_buf()) }
    }

    pub fn from_records(records: Vec<PingRecord>) -> Self {
        Self { source: Source::Memory(records) }
    }

    async fn load(&self) -> Result<Vec<PingRecord>, WarehouseError> {
        match &self.source {
            Source::Memory(records) => Ok(records.clone()),
            Source::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|source| {
                    WarehouseError::Io { path: path.display().to_string(), source }
                })?;
                Ok(parse_records(&content, &path.display().to_string()))
            }
        }
    }

    async fn matching(&self, query: &PingQuery) -> Result<Vec<TrackingPing>, WarehouseError> {
        let pings: Vec<TrackingPing> = self
            .load()
            .await?
            .into_iter()
            .filter(|r| query.matches(r.store_id, &r.ping))
            .map(|r| r.ping)
            .collect();
        debug!(store_floor = %query.store_floor, pings = %pings.len(), "warehouse_fetched");
        Ok(pings)
    }
}

/// Parse JSONL, skipping blank and malformed lines
pub fn parse_records(content: &str, source: &str) -> Vec<PingRecord> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<PingRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(source = %source, line = %(line_no + 1), error = %e, "ping_line_skipped");
            }
        }
    }

    if skipped > 0 {
        warn!(source = %source, skipped = %skipped, parsed = %records.len(), "ping_source_partial");
    }
    records
}

#[async_trait]
impl Warehouse for PingFileWarehouse {
    async fn fetch_pings(&self, query: &PingQuery) -> Result<Vec<TrackingPing>, WarehouseError> {
        self.matching(query).await
    }

    async fn zone_counts(&self, query: &PingQuery, rect: &RawRect) -> Result<ZoneCounts, WarehouseError> {
        let mut counter = ZoneCounter::new();
        for ping in self.matching(query).await?.iter().filter(|p| rect.contains(p.latitude, p.longitude)) {
            counter.add(ping);
        }
        Ok(counter.counts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DateRange, HourRange, StoreFloor};
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // 2024-03-01T13:30:00Z
    const T0: i64 = 1_709_299_800;

    fn query(store_id: i64, floor: i32) -> PingQuery {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        PingQuery::new(StoreFloor::new(store_id, floor), DateRange::day(day), HourRange::default())
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let content = format!(
            "{{\"store_id\":1,\"hash_id\":\"a\",\"timestamp\":{T0},\"latitude\":1.0,\"longitude\":2.0}}\n\
             not json\n\
             \n\
             {{\"store_id\":1,\"visitor_id\":\"b\",\"timestamp\":{T0},\"latitude\":1.0,\"longitude\":2.0,\"floor\":3}}\n"
        );
        let records = parse_records(&content, "inline");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ping.visitor_id.0, "a");
        assert_eq!(records[1].ping.floor, 3);
    }

    #[tokio::test]
    async fn test_fetch_filters_store_floor_and_date() {
        let warehouse = PingFileWarehouse::from_records(vec![
            PingRecord::new(1, TrackingPing::new("a", T0, 1.0, 2.0)),
            PingRecord::new(2, TrackingPing::new("b", T0, 1.0, 2.0)),
            PingRecord::new(1, TrackingPing { floor: 1, ..TrackingPing::new("c", T0, 1.0, 2.0) }),
            PingRecord::new(1, TrackingPing::new("d", T0 + 86_400, 1.0, 2.0)),
        ]);
        let pings = warehouse.fetch_pings(&query(1, 0)).await.unwrap();
        assert_eq!(pings.len(), 1);
        assert_eq!(pings[0].visitor_id.0, "a");
    }

    #[tokio::test]
    async fn test_hour_filter_is_inclusive() {
        let warehouse = PingFileWarehouse::from_records(vec![
            PingRecord::new(1, TrackingPing::new("13h", T0, 1.0, 2.0)),
            PingRecord::new(1, TrackingPing::new("14h", T0 + 1800, 1.0, 2.0)),
            PingRecord::new(1, TrackingPing::new("15h", T0 + 5400, 1.0, 2.0)),
        ]);
        let mut q = query(1, 0);
        q.hours = HourRange::new(13, 14).unwrap();
        let pings = warehouse.fetch_pings(&q).await.unwrap();
        assert_eq!(pings.len(), 2);
    }

    #[tokio::test]
    async fn test_zone_counts_in_raw_rect() {
        let warehouse = PingFileWarehouse::from_records(vec![
            PingRecord::new(1, TrackingPing::new("a", T0, 1.0, 2.0)),
            PingRecord::new(1, TrackingPing::new("a", T0 + 60, 1.0, 2.0)),
            PingRecord::new(1, TrackingPing::new("b", T0, 1.5, 2.5)),
            PingRecord::new(1, TrackingPing::new("c", T0, 9.0, 9.0)),
        ]);
        let rect = RawRect { lon_min: 1.5, lon_max: 2.5, lat_min: 1.0, lat_max: 1.5 };
        let counts = warehouse.zone_counts(&query(1, 0), &rect).await.unwrap();
        assert_eq!(counts.track_count, 3);
        assert_eq!(counts.unique_visitor_count, 2);
        assert_eq!(counts.visitor_day_count, 2);
    }

    #[tokio::test]
    async fn test_file_source() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{\"store_id\":1,\"hash_id\":\"a\",\"timestamp\":{T0},\"latitude\":1.0,\"longitude\":2.0}}")
            .unwrap();
        file.flush().unwrap();

        let warehouse = PingFileWarehouse::open(file.path());
        let pings = warehouse.fetch_pings(&query(1, 0)).await.unwrap();
        assert_eq!(pings.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let warehouse = PingFileWarehouse::open("/nonexistent/pings.jsonl");
        let err = warehouse.fetch_pings(&query(1, 0)).await.unwrap_err();
        assert!(matches!(err, WarehouseError::Io { .. }));
    }
}
