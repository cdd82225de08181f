//! Audit log: append inside a ledger transaction, read committed history.

use chrono::{DateTime, Utc};
use tracing::instrument;

use asrs_core::ItemId;
use asrs_warehouse::{AuditEntry, AuditFilter, NewAuditEntry};

use crate::store::{LedgerTransaction, StoreError, WarehouseStore};

/// Append `entry` as part of an open transaction. A failure here must abort
/// the transaction.
pub async fn append_in(
    tx: &mut dyn LedgerTransaction,
    entry: NewAuditEntry,
) -> Result<AuditEntry, StoreError> {
    let stored = tx.append_audit(entry).await?;
    tracing::debug!(
        audit_id = %stored.id,
        action = %stored.action,
        item_id = ?stored.item_id,
        compartment_id = ?stored.compartment_id,
        "audit entry appended"
    );
    Ok(stored)
}

/// Read side of the audit log, plus standalone appends.
#[derive(Debug, Clone)]
pub struct AuditLog<S> {
    store: S,
}

impl<S> AuditLog<S>
where
    S: WarehouseStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append an entry in its own transaction.
    #[instrument(skip(self, entry), fields(action = %entry.action), err)]
    pub async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let mut tx = self.store.begin().await?;
        let stored = append_in(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(stored)
    }

    pub async fn list_by_item(&self, item_id: ItemId) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.list_audit(&AuditFilter::for_item(item_id)).await
    }

    /// Entries recorded in `[from, to]`. A reversed range matches nothing.
    pub async fn list_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        self.store.list_audit(&AuditFilter::between(from, to)).await
    }

    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.list_audit(filter).await
    }
}
