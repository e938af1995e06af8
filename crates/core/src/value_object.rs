//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. Line items, courier details and settlement choices are
//! value objects: two line items with the same ingredient, quantity and cost
//! are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct CourierDetails { driver_name: String, plate_number: String }
///
/// impl ValueObject for CourierDetails {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
