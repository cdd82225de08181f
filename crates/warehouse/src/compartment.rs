//! Compartment state machine.
//!
//! A compartment is either `Empty` or `Occupied` by exactly one unit of one item.
//! The item reference lives inside the `Occupied` variant, so "occupied without
//! an item" and "empty but still pointing at an item" cannot be represented.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use asrs_core::{BoxId, CompartmentId, DomainError, DomainResult, Entity, ItemId};

use crate::topology::Location;

/// Persisted status label of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompartmentStatus {
    Empty,
    Occupied,
}

impl CompartmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CompartmentStatus::Empty => "Empty",
            CompartmentStatus::Occupied => "Occupied",
        }
    }
}

impl core::fmt::Display for CompartmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompartmentStatus {
    type Err = DomainError;

    /// Exact match only. Anything else is a corrupt row, see `integrity`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Empty" => Ok(CompartmentStatus::Empty),
            "Occupied" => Ok(CompartmentStatus::Occupied),
            other => Err(DomainError::invalid_state(format!(
                "unknown compartment status '{other}'"
            ))),
        }
    }
}

/// Occupancy of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "item_id")]
pub enum Occupancy {
    Empty,
    Occupied(ItemId),
}

impl Occupancy {
    pub fn status(self) -> CompartmentStatus {
        match self {
            Occupancy::Empty => CompartmentStatus::Empty,
            Occupancy::Occupied(_) => CompartmentStatus::Occupied,
        }
    }

    pub fn item_id(self) -> Option<ItemId> {
        match self {
            Occupancy::Empty => None,
            Occupancy::Occupied(item_id) => Some(item_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compartment {
    id: CompartmentId,
    box_id: BoxId,
    location: Location,
    occupancy: Occupancy,
}

impl Compartment {
    pub fn new(id: CompartmentId, box_id: BoxId, location: Location, occupancy: Occupancy) -> Self {
        Self {
            id,
            box_id,
            location,
            occupancy,
        }
    }

    pub fn empty(id: CompartmentId, box_id: BoxId, location: Location) -> Self {
        Self::new(id, box_id, location, Occupancy::Empty)
    }

    pub fn id_typed(&self) -> CompartmentId {
        self.id
    }

    pub fn box_id(&self) -> BoxId {
        self.box_id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn status(&self) -> CompartmentStatus {
        self.occupancy.status()
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.occupancy.item_id()
    }

    pub fn is_occupied_by(&self, item_id: ItemId) -> bool {
        self.occupancy == Occupancy::Occupied(item_id)
    }

    /// Empty → Occupied.
    pub fn occupy(&mut self, item_id: ItemId) -> DomainResult<()> {
        match self.occupancy {
            Occupancy::Empty => {
                self.occupancy = Occupancy::Occupied(item_id);
                Ok(())
            }
            Occupancy::Occupied(current) => Err(DomainError::invalid_state(format!(
                "compartment {} ({}) is already occupied by item {current}",
                self.id, self.location
            ))),
        }
    }

    /// Occupied → Empty, clearing the item reference. Returns the released item.
    pub fn release(&mut self) -> DomainResult<ItemId> {
        match self.occupancy {
            Occupancy::Occupied(item_id) => {
                self.occupancy = Occupancy::Empty;
                Ok(item_id)
            }
            Occupancy::Empty => Err(DomainError::invalid_state(format!(
                "compartment {} ({}) is already empty",
                self.id, self.location
            ))),
        }
    }
}

impl Entity for Compartment {
    type Id = CompartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compartment() -> Compartment {
        Compartment::empty(CompartmentId::new(1), BoxId::new(1), "D4c".parse().unwrap())
    }

    #[test]
    fn occupy_then_release_round_trips_through_both_states() {
        let mut c = compartment();
        let gear = ItemId::new(5);

        c.occupy(gear).unwrap();
        assert_eq!(c.status(), CompartmentStatus::Occupied);
        assert!(c.is_occupied_by(gear));

        assert_eq!(c.release().unwrap(), gear);
        assert_eq!(c.status(), CompartmentStatus::Empty);
        assert_eq!(c.item_id(), None);
    }

    #[test]
    fn second_release_is_an_invalid_state() {
        let mut c = compartment();
        c.occupy(ItemId::new(5)).unwrap();
        c.release().unwrap();

        let err = c.release().unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(msg) if msg.contains("already empty")));
    }

    #[test]
    fn occupying_an_occupied_compartment_is_rejected_without_change() {
        let mut c = compartment();
        c.occupy(ItemId::new(5)).unwrap();

        assert!(matches!(c.occupy(ItemId::new(6)), Err(DomainError::InvalidState(_))));
        assert!(c.is_occupied_by(ItemId::new(5)));
    }

    #[test]
    fn status_labels_are_strict() {
        assert_eq!("Empty".parse::<CompartmentStatus>().unwrap(), CompartmentStatus::Empty);
        assert_eq!(
            "Occupied".parse::<CompartmentStatus>().unwrap(),
            CompartmentStatus::Occupied
        );
        assert!("empty".parse::<CompartmentStatus>().is_err());
        assert!("Reserved".parse::<CompartmentStatus>().is_err());
    }
}
