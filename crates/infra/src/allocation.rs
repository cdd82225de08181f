//! Order fulfilment: turn a customer order into compartment releases, all or nothing.
//!
//! ## Flow
//!
//! ```text
//! PlaceOrder
//!   ↓
//! 1. Validate request, compute total (no storage access)
//!   ↓
//! 2. Begin ledger transaction            ┐
//!   ↓                                     │
//! 3. Resolve items, insert pending order  │ bounded by the
//!   ↓                                     │ transaction timeout
//! 4. Per line: lock + count, select,      │
//!    release, append `ordered` audit      ┘
//!   ↓
//! 5. Commit
//!   ↓
//! 6. Publish `OrderPlaced` (best effort)
//! ```
//!
//! Any failure in steps 2-4, including the timeout, discards the transaction:
//! no order, no order lines, no released compartment and no audit entry
//! survive. The commit itself is never cut short.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use asrs_core::{CompartmentId, DomainError, ItemId, OrderId};
use asrs_events::EventBus;
use asrs_warehouse::{
    NewAuditEntry, Order, PlaceOrder, ReleasedCompartment, WarehouseNotification, summarize,
};

use crate::audit_log;
use crate::ledger::{CompartmentLedger, LedgerError};
use crate::store::{LedgerTransaction, StoreError, WarehouseStore};

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AllocationError {
    /// Malformed request; nothing was read or written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough stock for one line. The whole order was rolled back.
    #[error("insufficient inventory for item {item_id}: have {available}, need {requested}")]
    InsufficientInventory {
        item_id: ItemId,
        available: u32,
        requested: u32,
    },

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("compartment {0} not found")]
    CompartmentNotFound(CompartmentId),

    /// A ledger transition from the wrong state. Indicates a bug or a writer
    /// bypassing the ledger.
    #[error("invalid compartment state: {0}")]
    InvalidState(String),

    /// Storage failure, conflict or timeout. The order was not placed.
    #[error("transaction failed: {0}")]
    Transaction(StoreError),
}

impl AllocationError {
    /// True for the business condition a storefront shows as "out of stock".
    pub fn is_out_of_stock(&self) -> bool {
        matches!(self, AllocationError::InsufficientInventory { .. })
    }
}

impl From<DomainError> for AllocationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                AllocationError::Validation(msg)
            }
            DomainError::InsufficientInventory {
                item_id,
                available,
                requested,
            } => AllocationError::InsufficientInventory {
                item_id,
                available,
                requested,
            },
            DomainError::ItemNotFound(id) => AllocationError::ItemNotFound(id),
            DomainError::CompartmentNotFound(id) => AllocationError::CompartmentNotFound(id),
            DomainError::InvalidState(msg) => AllocationError::InvalidState(msg),
        }
    }
}

impl From<StoreError> for AllocationError {
    fn from(value: StoreError) -> Self {
        AllocationError::Transaction(value)
    }
}

impl From<LedgerError> for AllocationError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Domain(err) => err.into(),
            LedgerError::Store(err) => err.into(),
        }
    }
}

/// A committed order with the compartments released for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    /// In line order, then release order within a line.
    pub releases: Vec<ReleasedCompartment>,
    /// One line per order line, e.g. `2 x Gear @ 10.00 = 20.00 [D4c, D5c]`.
    pub summary: String,
}

struct Allocation {
    releases: Vec<ReleasedCompartment>,
    item_names: BTreeMap<ItemId, String>,
}

/// The order-fulfilment transaction.
///
/// Generic over the store and the notification bus so tests run against
/// `InMemoryWarehouseStore` and `InMemoryEventBus`.
#[derive(Debug, Clone)]
pub struct AllocationEngine<S, B> {
    store: S,
    bus: B,
    timeout: Duration,
}

impl<S, B> AllocationEngine<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<S, B> AllocationEngine<S, B>
where
    S: WarehouseStore,
    B: EventBus<WarehouseNotification>,
{
    /// Place an order. Either the order is committed with every line satisfied,
    /// or nothing changes.
    #[instrument(
        skip(self, request),
        fields(lines = request.lines.len(), customer = %request.customer.email),
        err
    )]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<PlacedOrder, AllocationError> {
        let validated = request.validate()?;
        let order = validated.to_order(OrderId::new(), Utc::now());

        let work = self.allocate_in_transaction(&order);
        let (tx, allocation) = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(order_id = %order.id, timeout = ?self.timeout, "allocation timed out");
                return Err(AllocationError::Transaction(StoreError::Timeout(format!(
                    "allocation did not finish within {:?}",
                    self.timeout
                ))));
            }
        };

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            total = %order.total_amount,
            released = allocation.releases.len(),
            "order placed"
        );

        let summary = summarize(&order, &allocation.item_names, &allocation.releases);
        self.notify(WarehouseNotification::OrderPlaced {
            order_id: order.id,
            releases: allocation.releases.clone(),
            occurred_at: Utc::now(),
        });

        Ok(PlacedOrder {
            order,
            releases: allocation.releases,
            summary,
        })
    }

    /// Steps 2-4. On failure the transaction is rolled back before returning;
    /// on success it is handed back uncommitted.
    async fn allocate_in_transaction(
        &self,
        order: &Order,
    ) -> Result<(Box<dyn LedgerTransaction>, Allocation), AllocationError> {
        let mut tx = self.store.begin().await?;
        match allocate(&mut *tx, order).await {
            Ok(allocation) => Ok((tx, allocation)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed; transaction discarded on drop");
                }
                Err(err)
            }
        }
    }

    fn notify(&self, notification: WarehouseNotification) {
        if let Err(err) = self.bus.publish(notification) {
            tracing::warn!(error = ?err, "order notification failed; order stays committed");
        }
    }
}

async fn allocate(
    tx: &mut dyn LedgerTransaction,
    order: &Order,
) -> Result<Allocation, AllocationError> {
    let mut item_names = BTreeMap::new();
    for line in &order.lines {
        if item_names.contains_key(&line.item_id) {
            continue;
        }
        let item = tx
            .find_item(line.item_id)
            .await?
            .ok_or(AllocationError::ItemNotFound(line.item_id))?;
        item_names.insert(item.id, item.name);
    }

    tx.insert_order(order).await?;

    let mut ledger = CompartmentLedger::new(tx);
    let mut releases = Vec::new();

    for line in &order.lines {
        let available = ledger.count_occupied(line.item_id).await?;
        if available < line.quantity {
            tracing::warn!(
                item_id = %line.item_id,
                available,
                requested = line.quantity,
                "insufficient inventory"
            );
            return Err(DomainError::insufficient(line.item_id, available, line.quantity).into());
        }

        let targets = ledger
            .select_occupied_for_release(line.item_id, line.quantity)
            .await?;
        if (targets.len() as u32) < line.quantity {
            return Err(
                DomainError::insufficient(line.item_id, targets.len() as u32, line.quantity).into(),
            );
        }

        for target in targets {
            ledger.release(target.compartment_id).await?;
            audit_log::append_in(
                ledger.transaction(),
                NewAuditEntry::ordered(line.item_id, target.compartment_id),
            )
            .await?;
            releases.push(ReleasedCompartment {
                line_no: line.line_no,
                item_id: line.item_id,
                compartment_id: target.compartment_id,
                location: target.location,
            });
        }
    }

    Ok(Allocation {
        releases,
        item_names,
    })
}
