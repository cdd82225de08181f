//! Storage boundary for boxes, compartments, items, orders and the audit log.
//!
//! Everything above this module talks to `WarehouseStore` / `LedgerTransaction`
//! and never to a concrete backend.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryWarehouseStore;
pub use postgres::PostgresWarehouseStore;
pub use r#trait::{CompartmentRow, LedgerTransaction, StoreError, WarehouseStore};
