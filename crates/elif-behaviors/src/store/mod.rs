//! Entity stores
//!
//! The entity manager writes through the `EntityStore` trait. Stores speak in
//! mapped field values (see `ClassMetadata::mapped_values`) and hand rows back
//! with the identifier included under the class identifier name.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::entity::{EntityId, Fields};
use crate::error::BehaviorResult;
use crate::filter::FilterQuery;
use crate::metadata::ClassMetadata;

/// Transactional persistence backend
///
/// A flush calls `begin`, the writes, then `commit`; any error in between is
/// followed by `rollback`. Reads outside a transaction see committed data.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin(&self) -> BehaviorResult<()>;

    async fn commit(&self) -> BehaviorResult<()>;

    async fn rollback(&self) -> BehaviorResult<()>;

    /// Insert a row and return its new identifier
    async fn insert(&self, metadata: &ClassMetadata, values: &Fields) -> BehaviorResult<EntityId>;

    /// Overwrite the given fields of an existing row
    async fn update(
        &self,
        metadata: &ClassMetadata,
        id: EntityId,
        values: &Fields,
    ) -> BehaviorResult<()>;

    async fn delete(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<()>;

    async fn find(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<Option<Fields>>;

    /// Rows matching the query, ordered by identifier
    async fn select(
        &self,
        metadata: &ClassMetadata,
        query: &FilterQuery,
    ) -> BehaviorResult<Vec<Fields>>;

    async fn count(&self, metadata: &ClassMetadata, query: &FilterQuery) -> BehaviorResult<u64>;
}
