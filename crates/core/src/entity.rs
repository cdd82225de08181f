//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Boxes, compartments, items and orders are entities: two compartments with the
/// same occupant are still different compartments.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
