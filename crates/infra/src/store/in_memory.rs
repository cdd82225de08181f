use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use asrs_core::{AuditEntryId, BoxId, CompartmentId, ItemId, OrderId};
use asrs_warehouse::{
    AuditEntry, AuditFilter, Column, Compartment, CompartmentStatus, Item, Location, NewAuditEntry,
    NewItem, Order, TopologySpec,
};

use super::r#trait::{CompartmentRow, LedgerTransaction, StoreError, WarehouseStore};

#[derive(Debug, Clone, Default)]
struct State {
    boxes: BTreeMap<(Column, u16), BoxId>,
    compartments: BTreeMap<CompartmentId, CompartmentRow>,
    items: BTreeMap<ItemId, Item>,
    orders: Vec<Order>,
    audit: Vec<AuditEntry>,
    last_box_id: i64,
    last_compartment_id: i64,
    last_item_id: i64,
    last_audit_id: i64,
}

fn next_id(last: &mut i64) -> i64 {
    *last += 1;
    *last
}

impl State {
    fn row_at(&self, location: &Location) -> Option<&CompartmentRow> {
        self.compartments.values().find(|row| &row.location == location)
    }

    /// Rows that are validly occupied by `item_id`. Corrupt rows never match.
    fn occupied_rows(&self, item_id: ItemId) -> impl Iterator<Item = &CompartmentRow> {
        self.compartments.values().filter(move |row| {
            row.status == CompartmentStatus::Occupied.as_str() && row.item_id == Some(item_id)
        })
    }

    fn occupied_by(&self, item_id: ItemId) -> Result<Vec<Compartment>, StoreError> {
        let mut compartments = self
            .occupied_rows(item_id)
            .map(CompartmentRow::to_compartment)
            .collect::<Result<Vec<_>, _>>()?;
        compartments.sort_by(|a, b| {
            a.location()
                .cmp(b.location())
                .then_with(|| a.id_typed().cmp(&b.id_typed()))
        });
        Ok(compartments)
    }
}

/// In-memory warehouse store.
///
/// Intended for tests/dev. A transaction holds the single state lock for its
/// whole lifetime and works on a private copy that replaces the shared state on
/// commit, so transactions are serializable by construction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouseStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the persisted columns of a compartment, bypassing the ledger.
    ///
    /// This is how legacy writers touched the table; it exists so that corrupt
    /// rows can be reproduced.
    pub async fn write_raw(
        &self,
        id: CompartmentId,
        status: impl Into<String>,
        item_id: Option<ItemId>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let row = state
            .compartments
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("no compartment with id {id}")))?;
        row.status = status.into();
        row.item_id = item_id;
        Ok(())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn find_item(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn lock_occupied_by(&mut self, item_id: ItemId) -> Result<Vec<Compartment>, StoreError> {
        self.working.occupied_by(item_id)
    }

    async fn lock_compartment(
        &mut self,
        id: CompartmentId,
    ) -> Result<Option<Compartment>, StoreError> {
        self.working
            .compartments
            .get(&id)
            .map(CompartmentRow::to_compartment)
            .transpose()
    }

    async fn lock_compartment_at(
        &mut self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError> {
        self.working
            .row_at(location)
            .map(CompartmentRow::to_compartment)
            .transpose()
    }

    async fn update_compartment(
        &mut self,
        compartment: &Compartment,
        expected: CompartmentStatus,
    ) -> Result<(), StoreError> {
        let id = compartment.id_typed();
        let row = self
            .working
            .compartments
            .get_mut(&id)
            .ok_or_else(|| StoreError::Conflict(format!("compartment {id} disappeared")))?;

        if row.status != expected.as_str() {
            return Err(StoreError::Conflict(format!(
                "compartment {id} is '{}', expected '{expected}'",
                row.status
            )));
        }

        row.status = compartment.status().as_str().to_string();
        row.item_id = compartment.item_id();
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.working.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        if let Some(line) = order
            .lines
            .iter()
            .find(|line| !self.working.items.contains_key(&line.item_id))
        {
            return Err(StoreError::Backend(format!(
                "order line {} references unknown item {}",
                line.line_no, line.item_id
            )));
        }
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let id = AuditEntryId::new(next_id(&mut self.working.last_audit_id));
        // Never earlier than the previous entry, even if the wall clock steps back.
        let now = Utc::now();
        let recorded_at = self
            .working
            .audit
            .last()
            .map_or(now, |last| last.recorded_at.max(now));
        let stored = entry.stamp(id, recorded_at);
        self.working.audit.push(stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping the working copy is the rollback.
        Ok(())
    }
}

#[async_trait]
impl WarehouseStore for InMemoryWarehouseStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn provision(&self, topology: &TopologySpec) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let mut created = 0;

        for (column, row) in topology.box_positions() {
            let box_id = match state.boxes.get(&(column, row)) {
                Some(id) => *id,
                None => {
                    let id = BoxId::new(next_id(&mut state.last_box_id));
                    state.boxes.insert((column, row), id);
                    id
                }
            };

            for sub_slot in topology.sub_slots() {
                let location = Location::new(column, row, sub_slot.clone())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if state.row_at(&location).is_some() {
                    continue;
                }
                let id = CompartmentId::new(next_id(&mut state.last_compartment_id));
                state.compartments.insert(
                    id,
                    CompartmentRow {
                        id,
                        box_id,
                        location,
                        status: CompartmentStatus::Empty.as_str().to_string(),
                        item_id: None,
                    },
                );
                created += 1;
            }
        }

        Ok(created)
    }

    async fn create_item(&self, item: NewItem) -> Result<Item, StoreError> {
        let mut state = self.state.lock().await;
        let id = ItemId::new(next_id(&mut state.last_item_id));
        let item = Item {
            id,
            name: item.name,
            description: item.description,
            created_at: Utc::now(),
        };
        state.items.insert(id, item.clone());
        Ok(item)
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.state.lock().await.items.values().cloned().collect())
    }

    async fn compartment(&self, id: CompartmentId) -> Result<Option<Compartment>, StoreError> {
        self.state
            .lock()
            .await
            .compartments
            .get(&id)
            .map(CompartmentRow::to_compartment)
            .transpose()
    }

    async fn compartment_by_location(
        &self,
        location: &Location,
    ) -> Result<Option<Compartment>, StoreError> {
        self.state
            .lock()
            .await
            .row_at(location)
            .map(CompartmentRow::to_compartment)
            .transpose()
    }

    async fn occupied_count(&self, item_id: ItemId) -> Result<u32, StoreError> {
        let state = self.state.lock().await;
        Ok(state.occupied_rows(item_id).count() as u32)
    }

    async fn occupied_counts(&self) -> Result<BTreeMap<ItemId, u32>, StoreError> {
        let state = self.state.lock().await;
        let mut counts: BTreeMap<ItemId, u32> =
            state.items.keys().map(|id| (*id, 0)).collect();
        for row in state.compartments.values() {
            if row.status != CompartmentStatus::Occupied.as_str() {
                continue;
            }
            if let Some(count) = row.item_id.and_then(|id| counts.get_mut(&id)) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn list_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .filter(|entry| filter.matches(entry))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.state.lock().await.orders.clone())
    }

    async fn compartment_rows(&self) -> Result<Vec<CompartmentRow>, StoreError> {
        Ok(self.state.lock().await.compartments.values().cloned().collect())
    }

    async fn reset_compartment(&self, id: CompartmentId) -> Result<(), StoreError> {
        self.write_raw(id, CompartmentStatus::Empty.as_str(), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asrs_warehouse::Occupancy;

    async fn provisioned() -> InMemoryWarehouseStore {
        let store = InMemoryWarehouseStore::new();
        store.provision(&TopologySpec::default()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let store = InMemoryWarehouseStore::new();
        let topology = TopologySpec::default();

        assert_eq!(store.provision(&topology).await.unwrap(), 105);
        assert_eq!(store.provision(&topology).await.unwrap(), 0);
        assert_eq!(store.compartment_rows().await.unwrap().len(), 105);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = provisioned().await;
        let item = store.create_item(NewItem::new("Gear", "")).await.unwrap();
        let location: Location = "D4c".parse().unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let mut compartment = tx.lock_compartment_at(&location).await.unwrap().unwrap();
            compartment.occupy(item.id).unwrap();
            tx.update_compartment(&compartment, CompartmentStatus::Empty)
                .await
                .unwrap();
            // dropped without commit
        }

        let compartment = store.compartment_by_location(&location).await.unwrap().unwrap();
        assert_eq!(compartment.occupancy(), Occupancy::Empty);
        assert_eq!(store.occupied_count(item.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = provisioned().await;
        let item = store.create_item(NewItem::new("Gear", "")).await.unwrap();
        let location: Location = "A1a".parse().unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut compartment = tx.lock_compartment_at(&location).await.unwrap().unwrap();
        compartment.occupy(item.id).unwrap();
        tx.update_compartment(&compartment, CompartmentStatus::Empty)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.occupied_count(item.id).await.unwrap(), 1);
        assert_eq!(store.occupied_counts().await.unwrap()[&item.id], 1);
    }

    #[tokio::test]
    async fn guarded_update_rejects_stale_status() {
        let store = provisioned().await;
        let location: Location = "A1a".parse().unwrap();

        let mut tx = store.begin().await.unwrap();
        let compartment = tx.lock_compartment_at(&location).await.unwrap().unwrap();
        let err = tx
            .update_compartment(&compartment, CompartmentStatus::Occupied)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn corrupt_rows_are_never_counted_and_fail_typed_reads() {
        let store = provisioned().await;
        let item = store.create_item(NewItem::new("Gear", "")).await.unwrap();
        let compartment = store
            .compartment_by_location(&"B2b".parse().unwrap())
            .await
            .unwrap()
            .unwrap();

        store
            .write_raw(compartment.id_typed(), "Reserved", Some(item.id))
            .await
            .unwrap();

        assert_eq!(store.occupied_count(item.id).await.unwrap(), 0);
        assert!(matches!(
            store.compartment(compartment.id_typed()).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
