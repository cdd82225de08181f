//! Deterministic choice of which compartments to release for an order line.

use serde::{Deserialize, Serialize};

use asrs_core::{CompartmentId, ItemId};

use crate::compartment::Compartment;
use crate::topology::Location;

/// A compartment picked for release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTarget {
    pub compartment_id: CompartmentId,
    pub location: Location,
}

/// Pick up to `count` compartments occupied by `item_id`.
///
/// Order is lowest column letter first, then lowest row, then lowest sub-slot
/// label; the compartment id breaks ties between identical locations. The result
/// depends only on the set of compartments passed in, never on their order.
///
/// A result shorter than `count` means there is not enough stock; callers must
/// treat it as a failure rather than release a partial quantity.
pub fn select_for_release<'a, I>(compartments: I, item_id: ItemId, count: u32) -> Vec<ReleaseTarget>
where
    I: IntoIterator<Item = &'a Compartment>,
{
    let mut candidates: Vec<&Compartment> = compartments
        .into_iter()
        .filter(|c| c.is_occupied_by(item_id))
        .collect();

    candidates.sort_by(|a, b| {
        a.location()
            .cmp(b.location())
            .then_with(|| a.id_typed().cmp(&b.id_typed()))
    });

    candidates
        .into_iter()
        .take(count as usize)
        .map(|c| ReleaseTarget {
            compartment_id: c.id_typed(),
            location: c.location().clone(),
        })
        .collect()
}
