//! Store lookups for slug uniqueness

use async_trait::async_trait;
use std::sync::Arc;

use crate::entity::EntityId;
use crate::error::BehaviorResult;
use crate::filter::FilterQuery;
use crate::metadata::ClassMetadata;
use crate::store::EntityStore;

#[async_trait]
pub trait SluggableRepository: Send + Sync {
    /// Whether no stored record other than `id` already uses `slug`
    async fn is_slug_unique_for(
        &self,
        metadata: &ClassMetadata,
        id: Option<EntityId>,
        slug: &str,
    ) -> BehaviorResult<bool>;
}

/// Counts rows of the entity's table carrying the slug
pub struct DefaultSluggableRepository {
    store: Arc<dyn EntityStore>,
    slug_field: String,
}

impl DefaultSluggableRepository {
    pub fn new(store: Arc<dyn EntityStore>, slug_field: &str) -> Self {
        Self {
            store,
            slug_field: slug_field.to_string(),
        }
    }

    pub fn slug_field(&self) -> &str {
        &self.slug_field
    }

    fn uniqueness_query(&self, metadata: &ClassMetadata, id: Option<EntityId>, slug: &str) -> FilterQuery {
        let query = FilterQuery::new("e").where_eq(&self.slug_field, slug);
        match id {
            Some(id) => query.where_ne(metadata.identifier(), id.value()),
            None => query,
        }
    }
}

#[async_trait]
impl SluggableRepository for DefaultSluggableRepository {
    async fn is_slug_unique_for(
        &self,
        metadata: &ClassMetadata,
        id: Option<EntityId>,
        slug: &str,
    ) -> BehaviorResult<bool> {
        let query = self.uniqueness_query(metadata, id, slug);
        Ok(self.store.count(metadata, &query).await? == 0)
    }
}
