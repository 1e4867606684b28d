//! Typed repository over an entity manager

use std::fmt;
use std::marker::PhantomData;

use super::filterable::{Filterable, Filters};
use crate::entity::{EntityClass, EntityId};
use crate::entity_manager::EntityManager;
use crate::error::BehaviorResult;
use crate::filter::FilterQuery;
use crate::unit_of_work::EntityHandle;

/// Lookups for one entity class, filtered through `F`
///
/// Results are handles managed by the entity manager passed to each call.
pub struct EntityRepository<T, F> {
    filters: F,
    _entity: PhantomData<fn() -> T>,
}

impl<T: EntityClass, F: Filterable> EntityRepository<T, F> {
    pub fn new(filters: F) -> Self {
        Self {
            filters,
            _entity: PhantomData,
        }
    }

    pub fn filters(&self) -> &F {
        &self.filters
    }

    pub async fn find(
        &self,
        manager: &mut EntityManager,
        id: EntityId,
    ) -> BehaviorResult<Option<EntityHandle>> {
        manager.find::<T>(id).await
    }

    /// Every record of the class, ordered by identifier
    pub async fn find_all(&self, manager: &mut EntityManager) -> BehaviorResult<Vec<EntityHandle>> {
        manager
            .filter::<T>(&self.filters.create_filter_query())
            .await
    }

    pub async fn find_by_filters(
        &self,
        manager: &mut EntityManager,
        filters: &Filters,
    ) -> BehaviorResult<Vec<EntityHandle>> {
        let query = self.filters.filter_by(filters, None);
        manager.filter::<T>(&query).await
    }

    pub async fn count_by_filters(
        &self,
        manager: &mut EntityManager,
        filters: &Filters,
    ) -> BehaviorResult<u64> {
        let query = self.filters.filter_by(filters, None);
        manager.count::<T>(&query).await
    }

    /// Run a hand-built query extended with `filters`
    pub async fn find_by_query(
        &self,
        manager: &mut EntityManager,
        query: FilterQuery,
        filters: &Filters,
    ) -> BehaviorResult<Vec<EntityHandle>> {
        let query = self.filters.filter_by(filters, Some(query));
        manager.filter::<T>(&query).await
    }
}

impl<T: EntityClass, F> fmt::Debug for EntityRepository<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("entity", &T::CLASS_NAME)
            .finish()
    }
}
