//! Manual stock and retrieve operations performed by warehouse staff.
//!
//! They share the ledger with order fulfilment, so they go through the same
//! locked transitions and write the same audit log.

use tracing::instrument;

use asrs_core::{DomainError, ItemId};
use asrs_events::EventBus;
use asrs_warehouse::{AuditEntry, Location, NewAuditEntry, WarehouseNotification};

use crate::audit_log;
use crate::ledger::{CompartmentLedger, LedgerError};
use crate::store::{LedgerTransaction, WarehouseStore};

#[derive(Debug, Clone)]
pub struct ManualOperations<S, B> {
    store: S,
    bus: B,
}

impl<S, B> ManualOperations<S, B>
where
    S: WarehouseStore,
    B: EventBus<WarehouseNotification>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    /// Put one unit of `item_id` into the empty compartment at `location`.
    #[instrument(skip(self), fields(location = %location), err)]
    pub async fn stock(&self, location: &Location, item_id: ItemId) -> Result<AuditEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let outcome = stock_in(&mut *tx, location, item_id).await;
        let entry = finish(tx, outcome).await?;

        tracing::info!(%location, %item_id, "compartment stocked");
        if let Some(compartment_id) = entry.compartment_id {
            self.notify(WarehouseNotification::CompartmentStocked {
                compartment_id,
                item_id,
                location: location.clone(),
                occurred_at: entry.recorded_at,
            });
        }
        Ok(entry)
    }

    /// Take the unit out of the occupied compartment at `location`.
    #[instrument(skip(self), fields(location = %location), err)]
    pub async fn retrieve(&self, location: &Location) -> Result<AuditEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let outcome = retrieve_in(&mut *tx, location).await;
        let entry = finish(tx, outcome).await?;

        tracing::info!(%location, item_id = ?entry.item_id, "compartment retrieved");
        if let (Some(compartment_id), Some(item_id)) = (entry.compartment_id, entry.item_id) {
            self.notify(WarehouseNotification::CompartmentRetrieved {
                compartment_id,
                item_id,
                location: location.clone(),
                occurred_at: entry.recorded_at,
            });
        }
        Ok(entry)
    }

    fn notify(&self, notification: WarehouseNotification) {
        if let Err(err) = self.bus.publish(notification) {
            tracing::warn!(error = ?err, "hardware notification failed; change stays committed");
        }
    }
}

async fn stock_in(
    tx: &mut dyn LedgerTransaction,
    location: &Location,
    item_id: ItemId,
) -> Result<AuditEntry, LedgerError> {
    if tx.find_item(item_id).await?.is_none() {
        return Err(DomainError::ItemNotFound(item_id).into());
    }
    let mut ledger = CompartmentLedger::new(tx);
    let compartment = ledger.compartment_at(location).await?;
    ledger.occupy(compartment.id_typed(), item_id).await?;
    let entry = audit_log::append_in(
        ledger.transaction(),
        NewAuditEntry::added(item_id, compartment.id_typed()),
    )
    .await?;
    Ok(entry)
}

async fn retrieve_in(
    tx: &mut dyn LedgerTransaction,
    location: &Location,
) -> Result<AuditEntry, LedgerError> {
    let mut ledger = CompartmentLedger::new(tx);
    let compartment = ledger.compartment_at(location).await?;
    let item_id = ledger.release(compartment.id_typed()).await?;
    let entry = audit_log::append_in(
        ledger.transaction(),
        NewAuditEntry::retrieved(item_id, compartment.id_typed()),
    )
    .await?;
    Ok(entry)
}

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Box<dyn LedgerTransaction>,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed; transaction discarded on drop");
            }
            Err(err)
        }
    }
}
