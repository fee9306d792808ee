//! Result egress - writes analytics results to file
//!
//! Results are written in JSONL format (one JSON object per line)
//! to the file specified in config. Each line is wrapped with the
//! request id and result kind so one file can hold mixed runs.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    request_id: &'a str,
    kind: &'a str,
    result: &'a T,
}

/// Egress writer for pipeline results
pub struct ResultEgress {
    file_path: String,
}

impl ResultEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Write one result to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_result<T: Serialize>(&self, request_id: &str, kind: &str, result: &T) -> bool {
        let line = match serde_json::to_string(&Envelope { request_id, kind, result }) {
            Ok(line) => line,
            Err(e) => {
                error!(request_id = %request_id, kind = %kind, error = %e, "result_serialize_failed");
                return false;
            }
        };

        match self.append_line(&line) {
            Ok(()) => {
                info!(request_id = %request_id, kind = %kind, "result_egressed");
                true
            }
            Err(e) => {
                error!(request_id = %request_id, kind = %kind, error = %e, "result_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Zone, ZoneCounts, ZoneStats};
    use std::fs;
    use tempfile::tempdir;

    fn stats() -> Vec<ZoneStats> {
        let zone = Zone::new(4, "", 0.0, 0.0, 1.0, 1.0);
        vec![ZoneStats::from_counts(&zone, ZoneCounts { track_count: 3, unique_visitor_count: 2, visitor_day_count: 2 })]
    }

    #[test]
    fn test_write_result() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("results.jsonl");
        let egress = ResultEgress::new(file_path.to_str().unwrap());

        assert!(egress.write_result("req-1", "zones", &stats()));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["request_id"], "req-1");
        assert_eq!(parsed["kind"], "zones");
        assert_eq!(parsed["result"][0]["zone_name"], "Zone 4");
        assert_eq!(parsed["result"][0]["track_count"], 3);
        assert!(parsed["result"][0].get("error").is_none());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("results.jsonl");
        let egress = ResultEgress::new(nested_path.to_str().unwrap());

        assert!(egress.write_result("req-1", "zones", &stats()));
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("results.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = ResultEgress::new(file_path.to_str().unwrap());
        egress.write_result("req-2", "zones", &stats());
        egress.write_result("req-3", "zones", &stats());

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
        assert!(lines[2].contains("req-3"));
    }
}
