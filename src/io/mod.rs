//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `warehouse` - Raw ping source (trait + JSONL/in-memory implementation)
//! - `offsets` - Per-floor coordinate offset lookup
//! - `egress` - Result output to file (JSONL format)

pub mod egress;
pub mod offsets;
pub mod warehouse;

// Re-export commonly used types
pub use egress::ResultEgress;
pub use offsets::{ConfiguredOffsets, OffsetError, OffsetSource};
pub use warehouse::{PingFileWarehouse, PingRecord, Warehouse, WarehouseError};
