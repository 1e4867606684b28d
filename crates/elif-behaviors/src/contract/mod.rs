//! Capability traits entities implement to opt into a behavior
//!
//! Each trait extends `Entity` and carries the behavior's provided methods,
//! so an entity usually only supplies its accessors.

pub mod loggable;
pub mod sluggable;
pub mod soft_deletable;

pub use loggable::Loggable;
pub use sluggable::Sluggable;
pub use soft_deletable::SoftDeletable;
