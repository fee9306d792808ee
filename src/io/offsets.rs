//! Per-floor coordinate offsets

use crate::domain::types::{CoordinateOffset, StoreFloor};
use crate::infra::config::OffsetEntry;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OffsetError {
    #[error("offset store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of the calibration offset for a (store, floor)
#[async_trait]
pub trait OffsetSource: Send + Sync {
    /// `Ok(None)` when the floor was never calibrated
    async fn offset(&self, store_floor: StoreFloor) -> Result<Option<CoordinateOffset>, OffsetError>;
}

/// Offsets taken from the `[[offsets]]` config table
#[derive(Debug, Clone, Default)]
pub struct ConfiguredOffsets {
    offsets: FxHashMap<StoreFloor, CoordinateOffset>,
}

impl ConfiguredOffsets {
    /// Later entries for the same floor win
    pub fn new(entries: &[OffsetEntry]) -> Self {
        Self { offsets: entries.iter().map(|e| (e.store_floor(), e.offset())).collect() }
    }

    pub fn with(mut self, store_floor: StoreFloor, offset: CoordinateOffset) -> Self {
        self.offsets.insert(store_floor, offset);
        self
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

#[async_trait]
impl OffsetSource for ConfiguredOffsets {
    async fn offset(&self, store_floor: StoreFloor) -> Result<Option<CoordinateOffset>, OffsetError> {
        Ok(self.offsets.get(&store_floor).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_from_entries() {
        let offsets = ConfiguredOffsets::new(&[
            OffsetEntry { store_id: 1, floor: 0, offset_x: 0.5, offset_y: -0.5 },
            OffsetEntry { store_id: 1, floor: 1, offset_x: 1.0, offset_y: 1.0 },
            OffsetEntry { store_id: 1, floor: 0, offset_x: 0.25, offset_y: 0.0 },
        ]);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets.offset(StoreFloor::new(1, 0)).await.unwrap(), Some(CoordinateOffset::new(0.25, 0.0)));
        assert_eq!(offsets.offset(StoreFloor::new(1, 1)).await.unwrap(), Some(CoordinateOffset::new(1.0, 1.0)));
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let offsets = ConfiguredOffsets::default().with(StoreFloor::new(2, 0), CoordinateOffset::new(1.0, 0.0));
        assert_eq!(offsets.offset(StoreFloor::new(3, 0)).await.unwrap(), None);
    }
}
