//! `asrs-core` — domain foundation building blocks for the storage rack.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AuditEntryId, BoxId, CompartmentId, ItemId, OrderId};
pub use money::Money;
pub use value_object::ValueObject;
