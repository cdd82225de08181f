//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. A grid
/// location (`D4c`) or an amount of money are value objects; a compartment is not.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
