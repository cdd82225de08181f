//! Post-commit notifications and the wire messages sent to the rack controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use asrs_core::{CompartmentId, ItemId, OrderId};
use asrs_events::Event;

use crate::order::ReleasedCompartment;
use crate::topology::Location;

/// Published on the event bus after a ledger transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseNotification {
    OrderPlaced {
        order_id: OrderId,
        releases: Vec<ReleasedCompartment>,
        occurred_at: DateTime<Utc>,
    },
    CompartmentStocked {
        compartment_id: CompartmentId,
        item_id: ItemId,
        location: Location,
        occurred_at: DateTime<Utc>,
    },
    CompartmentRetrieved {
        compartment_id: CompartmentId,
        item_id: ItemId,
        location: Location,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for WarehouseNotification {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseNotification::OrderPlaced { .. } => "warehouse.order.placed",
            WarehouseNotification::CompartmentStocked { .. } => "warehouse.compartment.stocked",
            WarehouseNotification::CompartmentRetrieved { .. } => "warehouse.compartment.retrieved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseNotification::OrderPlaced { occurred_at, .. }
            | WarehouseNotification::CompartmentStocked { occurred_at, .. }
            | WarehouseNotification::CompartmentRetrieved { occurred_at, .. } => *occurred_at,
        }
    }
}

impl WarehouseNotification {
    /// The message the hardware bridge forwards to the rack controller.
    pub fn hardware_message(&self) -> HardwareMessage {
        match self {
            WarehouseNotification::OrderPlaced {
                order_id, releases, ..
            } => HardwareMessage::OrderPlaced {
                order_id: *order_id,
                items: releases.iter().map(|r| r.item_id).collect(),
                locations: releases.iter().map(|r| r.location.clone()).collect(),
                tags: box_tags(releases.iter().map(|r| &r.location)),
            },
            WarehouseNotification::CompartmentStocked { location, .. } => {
                HardwareMessage::ProductAdded {
                    subcom_place: location.clone(),
                    status: "Occupied".to_string(),
                    tag: location.store_tag(),
                }
            }
            WarehouseNotification::CompartmentRetrieved { location, .. } => {
                HardwareMessage::ProductRetrieved {
                    locations: vec![location.clone()],
                    tags: vec![location.retrieve_tag()],
                }
            }
        }
    }
}

/// Retrieve tags for a set of locations, one per box, first-seen order.
fn box_tags<'a>(locations: impl Iterator<Item = &'a Location>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in locations.map(Location::retrieve_tag) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// JSON payloads understood by the rack controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HardwareMessage {
    ProductAdded {
        subcom_place: Location,
        status: String,
        tag: String,
    },
    ProductRetrieved {
        locations: Vec<Location>,
        tags: Vec<String>,
    },
    OrderPlaced {
        order_id: OrderId,
        items: Vec<ItemId>,
        locations: Vec<Location>,
        tags: Vec<String>,
    },
}

impl HardwareMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d4c() -> Location {
        "D4c".parse().unwrap()
    }

    #[test]
    fn stocked_compartment_produces_product_added() {
        let event = WarehouseNotification::CompartmentStocked {
            compartment_id: CompartmentId::new(1),
            item_id: ItemId::new(2),
            location: d4c(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "warehouse.compartment.stocked");
        assert_eq!(
            event.hardware_message().to_json().unwrap(),
            r#"{"type":"product_added","subcom_place":"D4c","status":"Occupied","tag":"D4S"}"#
        );
    }

    #[test]
    fn retrieved_compartment_produces_product_retrieved() {
        let event = WarehouseNotification::CompartmentRetrieved {
            compartment_id: CompartmentId::new(1),
            item_id: ItemId::new(2),
            location: d4c(),
            occurred_at: Utc::now(),
        };
        assert_eq!(
            event.hardware_message().to_json().unwrap(),
            r#"{"type":"product_retrieved","locations":["D4c"],"tags":["D4"]}"#
        );
    }

    #[test]
    fn order_placed_lists_each_box_once() {
        let release = |line_no, id, label: &str| ReleasedCompartment {
            line_no,
            item_id: ItemId::new(7),
            compartment_id: CompartmentId::new(id),
            location: label.parse().unwrap(),
        };
        let event = WarehouseNotification::OrderPlaced {
            order_id: OrderId::new(),
            releases: vec![release(1, 1, "D4a"), release(1, 2, "D4c"), release(2, 3, "E1a")],
            occurred_at: Utc::now(),
        };

        match event.hardware_message() {
            HardwareMessage::OrderPlaced {
                items,
                locations,
                tags,
                ..
            } => {
                assert_eq!(items.len(), 3);
                assert_eq!(locations.len(), 3);
                assert_eq!(tags, ["D4", "E1"]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
