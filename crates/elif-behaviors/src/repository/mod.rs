//! Repository-side helpers used by the behaviors

pub mod entity;
pub mod filterable;
pub mod sluggable;

pub use entity::EntityRepository;
pub use filterable::{Filterable, Filters};
pub use sluggable::{DefaultSluggableRepository, SluggableRepository};
