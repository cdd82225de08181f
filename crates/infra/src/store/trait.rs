use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use asrs_core::{BoxId, CompartmentId, ItemId, OrderId};
use asrs_warehouse::{
    AuditEntry, AuditFilter, Compartment, CompartmentStatus, Item, Location, NewAuditEntry, NewItem,
    Order, StateCorruption, TopologySpec, classify_row,
};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors. Every one of
/// them is fatal to the enclosing transaction.
///
/// ## Error Categories
///
/// - **Conflict**: serialization failure, deadlock, lock not available, or a
///   guarded update that matched no row because another writer got there first
/// - **Timeout**: the transaction did not finish within its budget
/// - **Corrupt**: a persisted compartment row violates the status/item invariant
/// - **Backend**: anything else the backend reports (connection, pool, SQL)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("storage timeout: {0}")]
    Timeout(String),

    #[error("corrupt compartment state: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateCorruption> for StoreError {
    fn from(value: StateCorruption) -> Self {
        StoreError::Corrupt(value.to_string())
    }
}

/// A compartment exactly as persisted: status is free text and the item
/// reference is independent of it.
///
/// Only the integrity check looks at rows in this form. Everything else goes
/// through `to_compartment`, which refuses rows that break the invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompartmentRow {
    pub id: CompartmentId,
    pub box_id: BoxId,
    pub location: Location,
    pub status: String,
    pub item_id: Option<ItemId>,
}

impl CompartmentRow {
    pub fn to_compartment(&self) -> Result<Compartment, StoreError> {
        let occupancy = classify_row(self.id, &self.status, self.item_id)?;
        Ok(Compartment::new(
            self.id,
            self.box_id,
            self.location.clone(),
            occupancy,
        ))
    }
}

/// One storage transaction over the ledger, the audit log and the order tables.
///
/// ## Semantics
///
/// - Reads named `lock_*` take row locks held until `commit`/`rollback`; a
///   concurrent transaction touching the same rows waits or fails with
///   `StoreError::Conflict`.
/// - `update_compartment` is guarded: it only applies if the persisted status
///   still equals `expected`, otherwise it fails with `Conflict`.
/// - Dropping a transaction without calling `commit` discards every change.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Lock every compartment occupied by `item_id`, in release order.
    async fn lock_occupied_by(&mut self, item_id: ItemId) -> Result<Vec<Compartment>, StoreError>;

    async fn lock_compartment(
        &mut self,
        id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError>;

    async fn lock_compartment_at(
        &mut self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError>;

    async fn update_compartment(
        &mut self,
        compartment: &Compartment,
        expected: CompartmentStatus,
    ) -> Result<(), StoreError>;

    /// Insert the order row and all of its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Assign the next audit id and persist the entry.
    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage boundary for the rack.
///
/// Implementations:
/// - `InMemoryWarehouseStore` (tests/dev, serializable by construction)
/// - `PostgresWarehouseStore` (production, row locks + guarded updates)
///
/// Non-transactional reads observe committed state only.
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    /// Create any missing boxes and compartments for `topology`. Idempotent;
    /// returns how many compartments were created.
    async fn provision(&self, topology: &TopologySpec) -> Result<usize, StoreError>;

    async fn create_item(&self, item: NewItem) -> Result<Item, StoreError>;

    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    async fn compartment(&self, id: CompartmentId) -> Result<Option<Compartment>, StoreError>;

    async fn compartment_by_location(
        &self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError>;

    async fn occupied_count(&self, item_id: ItemId) -> Result<u32, StoreError>;

    /// Occupied counts for every catalog item, including items with no stock.
    async fn occupied_counts(&self) -> Result<BTreeMap<ItemId, u32>, StoreError>;

    /// Matching entries in append order, truncated to `filter.limit`.
    async fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Every compartment row as persisted, for the integrity check.
    async fn compartment_rows(&self) -> Result<Vec<CompartmentRow>, StoreError>;

    /// Rewrite a row to `Empty` with no item reference, whatever it held.
    async fn reset_compartment(&self, id: CompartmentId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> WarehouseStore for Arc<S>
where
    S: WarehouseStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn provision(&self, topology: &TopologySpec) -> Result<usize, StoreError> {
        (**self).provision(topology).await
    }

    async fn create_item(&self, item: NewItem) -> Result<Item, StoreError> {
        (**self).create_item(item).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }

    async fn compartment(&self, id: CompartmentId) -> Result<Option<Compartment>, StoreError> {
        (**self).compartment(id).await
    }

    async fn compartment_by_location(
        &self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError> {
        (**self).compartment_by_location(location).await
    }

    async fn occupied_count(&self, item_id: ItemId) -> Result<u32, StoreError> {
        (**self).occupied_count(item_id).await
    }

    async fn occupied_counts(&self) -> Result<BTreeMap<ItemId, u32>, StoreError> {
        (**self).occupied_counts().await
    }

    async fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        (**self).list_audit(filter).await
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_orders().await
    }

    async fn compartment_rows(&self) -> Result<Vec<CompartmentRow>, StoreError> {
        (**self).compartment_rows().await
    }

    async fn reset_compartment(&self, id: CompartmentId) -> Result<(), StoreError> {
        (**self).reset_compartment(id).await
    }
}
