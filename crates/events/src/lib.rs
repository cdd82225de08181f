//! Post-commit notifications: event trait and publish/subscribe mechanics.
//!
//! Nothing in this crate participates in a ledger transaction. Publication
//! happens after commit and is best-effort.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, NullEventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
