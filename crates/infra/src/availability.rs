//! Read-only stock counts.
//!
//! Not authoritative: the allocation engine re-counts under row locks.

use std::collections::BTreeMap;

use asrs_core::ItemId;

use crate::store::{StoreError, WarehouseStore};

#[derive(Debug, Clone)]
pub struct AvailabilityQuery<S> {
    store: S,
}

impl<S> AvailabilityQuery<S>
where
    S: WarehouseStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Occupied compartments holding `item_id`. Unknown items have zero.
    pub async fn get(&self, item_id: ItemId) -> Result<u32, StoreError> {
        self.store.occupied_count(item_id).await
    }

    /// Counts for every catalog item, zero-stock items included.
    pub async fn all(&self) -> Result<BTreeMap<ItemId, u32>, StoreError> {
        self.store.occupied_counts().await
    }
}
