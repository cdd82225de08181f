//! Classification of persisted compartment rows.
//!
//! Legacy data stores the status as free text next to a nullable item column,
//! so rows like `("Occupied", NULL)` or `("Reserved", 4)` exist in the wild.
//! They are detected here and either repaired or rejected by the caller.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use asrs_core::{CompartmentId, DomainError, ItemId};

use crate::compartment::{CompartmentStatus, Occupancy};

/// What to do with a corrupt row found at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Rewrite the row to `Empty` with no item and log a warning.
    #[default]
    Repair,
    /// Refuse to start.
    Reject,
}

impl FromStr for IntegrityPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repair" => Ok(IntegrityPolicy::Repair),
            "reject" => Ok(IntegrityPolicy::Reject),
            other => Err(DomainError::validation(format!(
                "unknown integrity policy '{other}', expected 'repair' or 'reject'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorruptionKind {
    UnknownStatus(String),
    OccupiedWithoutItem,
    EmptyWithItem(ItemId),
}

impl core::fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CorruptionKind::UnknownStatus(status) => write!(f, "unknown status '{status}'"),
            CorruptionKind::OccupiedWithoutItem => f.write_str("occupied without an item"),
            CorruptionKind::EmptyWithItem(item) => write!(f, "empty but references item {item}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCorruption {
    pub compartment_id: CompartmentId,
    pub kind: CorruptionKind,
}

impl core::fmt::Display for StateCorruption {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "compartment {}: {}", self.compartment_id, self.kind)
    }
}

impl From<StateCorruption> for DomainError {
    fn from(value: StateCorruption) -> Self {
        DomainError::invalid_state(value.to_string())
    }
}

impl IntegrityPolicy {
    /// Apply the policy to one classified row. `Repair` yields `Empty` for a
    /// corrupt row; `Reject` hands the corruption back.
    pub fn resolve(
        self,
        classified: Result<Occupancy, StateCorruption>,
    ) -> Result<Occupancy, StateCorruption> {
        match (self, classified) {
            (_, Ok(occupancy)) => Ok(occupancy),
            (IntegrityPolicy::Repair, Err(_)) => Ok(Occupancy::Empty),
            (IntegrityPolicy::Reject, Err(corruption)) => Err(corruption),
        }
    }
}

/// Turn a raw `(status, item_id)` pair into a valid occupancy.
pub fn classify_row(
    compartment_id: CompartmentId,
    status: &str,
    item_id: Option<ItemId>,
) -> Result<Occupancy, StateCorruption> {
    let corrupt = |kind| StateCorruption {
        compartment_id,
        kind,
    };

    match (CompartmentStatus::from_str(status), item_id) {
        (Ok(CompartmentStatus::Occupied), Some(item)) => Ok(Occupancy::Occupied(item)),
        (Ok(CompartmentStatus::Occupied), None) => Err(corrupt(CorruptionKind::OccupiedWithoutItem)),
        (Ok(CompartmentStatus::Empty), None) => Ok(Occupancy::Empty),
        (Ok(CompartmentStatus::Empty), Some(item)) => Err(corrupt(CorruptionKind::EmptyWithItem(item))),
        (Err(_), _) => Err(corrupt(CorruptionKind::UnknownStatus(status.to_string()))),
    }
}
