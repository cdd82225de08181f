//! Infrastructure layer: storage backends, the ledger transaction, order
//! fulfilment and configuration.

pub mod allocation;
pub mod audit_log;
pub mod availability;
pub mod config;
pub mod integrity;
pub mod ledger;
pub mod operations;
pub mod store;


pub use allocation::{AllocationEngine, AllocationError, PlacedOrder};
pub use audit_log::AuditLog;
pub use availability::AvailabilityQuery;
pub use config::{ConfigError, WarehouseConfig};
pub use integrity::{IntegrityError, IntegrityReport, check_integrity};
pub use ledger::{CompartmentLedger, LedgerError};
pub use operations::ManualOperations;
pub use store::{
    CompartmentRow, InMemoryWarehouseStore, LedgerTransaction, PostgresWarehouseStore, StoreError,
    WarehouseStore,
};
