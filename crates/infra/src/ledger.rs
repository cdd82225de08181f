//! Compartment ledger: the only path through which compartment occupancy changes.
//!
//! Both the allocation engine and the manual stock/retrieve operations go
//! through these methods, so the Empty/Occupied transition rules and the
//! guarded writes are enforced in one place.

use thiserror::Error;
use tracing::instrument;

use asrs_core::{CompartmentId, DomainError, ItemId};
use asrs_warehouse::{Compartment, CompartmentStatus, Location, ReleaseTarget, select_for_release};

use crate::store::{LedgerTransaction, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ledger operations bound to one open storage transaction.
pub struct CompartmentLedger<'t> {
    tx: &'t mut dyn LedgerTransaction,
}

impl<'t> CompartmentLedger<'t> {
    pub fn new(tx: &'t mut dyn LedgerTransaction) -> Self {
        Self { tx }
    }

    /// The underlying transaction, for writes that are not ledger transitions
    /// (orders, audit entries).
    pub fn transaction(&mut self) -> &mut dyn LedgerTransaction {
        &mut *self.tx
    }

    /// Number of compartments occupied by `item_id`. Locks those rows.
    #[instrument(skip(self), err)]
    pub async fn count_occupied(&mut self, item_id: ItemId) -> Result<u32, LedgerError> {
        let occupied = self.tx.lock_occupied_by(item_id).await?;
        Ok(occupied.len() as u32)
    }

    /// Up to `count` compartments to release for `item_id`, in release order.
    ///
    /// A short result is not an error here; the caller decides.
    #[instrument(skip(self), err)]
    pub async fn select_occupied_for_release(
        &mut self,
        item_id: ItemId,
        count: u32,
    ) -> Result<Vec<ReleaseTarget>, LedgerError> {
        let occupied = self.tx.lock_occupied_by(item_id).await?;
        Ok(select_for_release(&occupied, item_id, count))
    }

    /// Occupied → Empty. Returns the item that was released.
    #[instrument(skip(self), err)]
    pub async fn release(&mut self, id: CompartmentId) -> Result<ItemId, LedgerError> {
        let mut compartment = self.locked(id).await?;
        let item_id = compartment.release().inspect_err(|err| {
            tracing::error!(compartment_id = %id, error = %err, "release of an empty compartment");
        })?;
        self.tx
            .update_compartment(&compartment, CompartmentStatus::Occupied)
            .await?;
        Ok(item_id)
    }

    /// Empty → Occupied.
    #[instrument(skip(self), err)]
    pub async fn occupy(&mut self, id: CompartmentId, item_id: ItemId) -> Result<(), LedgerError> {
        let mut compartment = self.locked(id).await?;
        compartment.occupy(item_id).inspect_err(|err| {
            tracing::error!(compartment_id = %id, error = %err, "occupy of an occupied compartment");
        })?;
        self.tx
            .update_compartment(&compartment, CompartmentStatus::Empty)
            .await?;
        Ok(())
    }

    /// Lock the compartment at `location`.
    pub async fn compartment_at(&mut self, location: &Location) -> Result<Compartment, LedgerError> {
        self.tx.lock_compartment_at(location).await?.ok_or_else(|| {
            LedgerError::Domain(DomainError::validation(format!(
                "no compartment at {location}"
            )))
        })
    }

    async fn locked(&mut self, id: CompartmentId) -> Result<Compartment, LedgerError> {
        self.tx
            .lock_compartment(id)
            .await?
            .ok_or(LedgerError::Domain(DomainError::CompartmentNotFound(id)))
    }
}
