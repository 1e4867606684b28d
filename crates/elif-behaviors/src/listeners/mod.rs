//! Event listeners implementing the behaviors

pub mod loggable;
pub mod sluggable;
pub mod soft_deletable;

pub use loggable::{ChangeLogger, LoggableListener, TracingChangeLogger};
pub use sluggable::SluggableListener;
pub use soft_deletable::SoftDeletableListener;
