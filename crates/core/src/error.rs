//! Domain error model.

use thiserror::Error;

use crate::id::{CompartmentId, ItemId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock shortfalls, illegal compartment transitions). Storage failures belong
/// to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request failed validation (e.g. zero quantity, malformed email).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough occupied compartments hold the item to satisfy a line.
    #[error("insufficient inventory for item {item_id}: have {available}, need {requested}")]
    InsufficientInventory {
        item_id: ItemId,
        available: u32,
        requested: u32,
    },

    /// A referenced item does not exist in the catalog.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// A referenced compartment does not exist in the topology.
    #[error("compartment {0} not found")]
    CompartmentNotFound(CompartmentId),

    /// A compartment transition was attempted from the wrong state
    /// (double release, occupying an occupied slot).
    #[error("invalid compartment state: {0}")]
    InvalidState(String),

    /// An identifier or label was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient(item_id: ItemId, available: u32, requested: u32) -> Self {
        Self::InsufficientInventory {
            item_id,
            available,
            requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_inventory_message_names_both_counts() {
        let err = DomainError::insufficient(ItemId::new(3), 7, 8);
        assert_eq!(
            err.to_string(),
            "insufficient inventory for item 3: have 7, need 8"
        );
    }
}
