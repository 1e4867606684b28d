//! # elif-behaviors: Entity Behaviors for elif.rs
//!
//! Reusable behaviors for entities managed through a unit of work:
//! unique slugs, change logging, soft deletion and filter-by-map queries.
//!
//! Entities opt into a behavior by implementing its capability trait
//! (`Sluggable`, `Loggable`, `SoftDeletable`) and returning themselves from
//! the matching `Entity::as_*` accessor. The behaviors themselves are event
//! listeners registered on an `EntityManager`, which owns the unit of work
//! and writes to an `EntityStore` (in memory or PostgreSQL).

pub mod config;
pub mod contract;
pub mod entity;
pub mod entity_manager;
pub mod error;
pub mod events;
pub mod filter;
pub mod listeners;
pub mod logging;
pub mod metadata;
pub mod repository;
pub mod slug;
pub mod store;
pub mod unit_of_work;

// Re-export core traits and types
pub use config::{BehaviorsConfig, ConfigError};
pub use contract::{Loggable, Sluggable, SoftDeletable};
pub use entity::*;
pub use entity_manager::EntityManager;
pub use error::{BehaviorError, BehaviorResult};
pub use events::{
    EventListener, EventManager, Events, LifecycleEventArgs, LoadClassMetadataEventArgs,
    OnFlushEventArgs,
};
pub use filter::{Conjunction, FilterCondition, FilterOperator, FilterQuery, SqlParameter};
pub use listeners::{
    ChangeLogger, LoggableListener, SluggableListener, SoftDeletableListener, TracingChangeLogger,
};
pub use logging::{init_logging, LoggingConfig};
pub use metadata::{Capabilities, ClassMetadata, FieldMapping, FieldType, MetadataFactory};
pub use repository::{
    DefaultSluggableRepository, EntityRepository, Filterable, Filters, SluggableRepository,
};
pub use slug::slugify;
pub use store::{EntityStore, MemoryStore, PgStore};
pub use unit_of_work::{EntityHandle, EntityState, UnitOfWork};
