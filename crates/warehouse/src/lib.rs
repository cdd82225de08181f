//! Warehouse domain module.
//!
//! Business rules for the storage rack: grid topology, the compartment state
//! machine, deterministic release selection, order validation and the audit
//! model. Implemented purely as deterministic domain logic (no IO, no storage).

pub mod audit;
pub mod catalog;
pub mod compartment;
pub mod integrity;
pub mod notification;
pub mod order;
pub mod selection;
pub mod topology;

pub use audit::{AuditAction, AuditEntry, AuditFilter, NewAuditEntry};
pub use catalog::{Item, NewItem};
pub use compartment::{Compartment, CompartmentStatus, Occupancy};
pub use integrity::{CorruptionKind, IntegrityPolicy, StateCorruption, classify_row};
pub use notification::{HardwareMessage, WarehouseNotification};
pub use order::{
    Customer, MAX_AMOUNT_CENTS, MAX_LINE_QUANTITY, Order, OrderLine, OrderLineRequest,
    OrderStatus, PlaceOrder, ReleasedCompartment, ValidatedOrder, summarize,
};
pub use selection::{ReleaseTarget, select_for_release};
pub use topology::{Column, Location, StorageBox, SubSlot, TopologySpec};
