//! Integration tests for configuration loading

use store_dwell::domain::types::{CoordinateOffset, StoreFloor};
use store_dwell::infra::Config;
use store_dwell::io::{ConfiguredOffsets, OffsetSource};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[analysis]
grid_size = 0.5
spatial_threshold = 3.0
min_dwell_time = 45
max_dwell_cap = 1200
partitions = 4

[projection]
meters_per_degree = 111320.0
lon_scale = 0.64

[warehouse]
pings_file = "data/pings.jsonl"
fetch_timeout_ms = 5000

[egress]
file = "out/results.jsonl"

[metrics]
interval_secs = 15

[[offsets]]
store_id = 7
floor = 0
offset_x = 0.0001
offset_y = -0.0002

[[offsets]]
store_id = 7
floor = 1
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.grid_size(), 0.5);
    assert_eq!(config.spatial_threshold(), 3.0);
    assert_eq!(config.min_dwell_time(), 45);
    assert_eq!(config.max_dwell_cap(), 1200);
    assert_eq!(config.partitions(), 4);
    assert_eq!(config.projection().meters_per_degree, 111_320.0);
    assert_eq!(config.projection().lon_scale, 0.64);
    assert_eq!(config.pings_file(), "data/pings.jsonl");
    assert_eq!(config.fetch_timeout_ms(), 5000);
    assert_eq!(config.egress_file(), "out/results.jsonl");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.offsets().len(), 2);
    assert_eq!(config.offsets()[1].offset_x, 0.0);
    assert!(config.config_file().ends_with(temp_file.path().file_name().unwrap().to_str().unwrap()));
}

#[tokio::test]
async fn test_offsets_from_config() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[[offsets]]\nstore_id = 3\nfloor = 2\noffset_x = 1.5\noffset_y = 2.5\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let offsets = ConfiguredOffsets::new(config.offsets());

    assert_eq!(offsets.offset(StoreFloor::new(3, 2)).await.unwrap(), Some(CoordinateOffset::new(1.5, 2.5)));
    assert_eq!(offsets.offset(StoreFloor::new(3, 0)).await.unwrap(), None);
}

#[test]
fn test_invalid_file_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[analysis]\ngrid_size = \"wide\"\n").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.grid_size(), 1.0);
    assert_eq!(config.spatial_threshold(), 2.0);
    assert_eq!(config.pings_file(), "pings.jsonl");
}
