//! Component identifiers.

/// Unique identifier of a registered simulation object.
///
/// Identifiers are assigned sequentially starting from 0 as objects are registered with a
/// [`Simulator`](crate::Simulator), mirroring the order in which their names were first seen.
pub type Id = u32;
