//! Entity manager - persist, remove, find and flush through the listeners
//!
//! The manager owns the unit of work, the class metadata cache and the
//! listeners, and writes to an `EntityStore`. A flush runs in one store
//! transaction:
//!
//! 1. change sets of pending insertions and managed entities are computed
//! 2. `on_flush` is dispatched
//! 3. insertions are written, each followed by `post_persist`
//! 4. updates run `pre_update`, are recomputed, written, then `post_update`
//! 5. extra updates scheduled by listeners are written
//! 6. deletions are written, each followed by `post_remove`
//!
//! Any error rolls the store transaction back and is returned unchanged.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::BehaviorsConfig;
use crate::entity::{Entity, EntityClass, EntityId, Fields};
use crate::error::{BehaviorError, BehaviorResult};
use crate::events::{EventListener, EventManager, Events};
use crate::filter::FilterQuery;
use crate::listeners::{LoggableListener, SluggableListener, SoftDeletableListener};
use crate::metadata::{Capabilities, ClassMetadata, MetadataFactory};
use crate::repository::DefaultSluggableRepository;
use crate::store::EntityStore;
use crate::unit_of_work::{EntityHandle, EntityState, UnitOfWork};

pub struct EntityManager {
    store: Arc<dyn EntityStore>,
    events: EventManager,
    metadata: MetadataFactory,
    unit_of_work: UnitOfWork,
}

impl EntityManager {
    /// Manager without any listener
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            events: EventManager::new(),
            metadata: MetadataFactory::new(),
            unit_of_work: UnitOfWork::new(),
        }
    }

    /// Manager with the sluggable, soft-deletable and loggable listeners
    pub fn with_behaviors(
        store: Arc<dyn EntityStore>,
        config: &BehaviorsConfig,
    ) -> BehaviorResult<Self> {
        config.validate()?;

        let repository = Arc::new(DefaultSluggableRepository::new(
            Arc::clone(&store),
            &config.slug_field,
        ));

        let manager = Self::new(store)
            .with_listener(Arc::new(SluggableListener::new(config, repository)))
            .with_listener(Arc::new(SoftDeletableListener::new(config)))
            .with_listener(Arc::new(LoggableListener::new(config)?));
        Ok(manager)
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.events.add_listener(listener);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.events.add_listener(listener);
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork {
        &mut self.unit_of_work
    }

    /// Loaded metadata of a class, if registered
    pub fn class_metadata(&self, class_name: &str) -> BehaviorResult<Arc<ClassMetadata>> {
        self.metadata
            .get(class_name)
            .ok_or_else(|| BehaviorError::UnknownEntity(class_name.to_string()))
    }

    /// Load the metadata of `T`, letting every listener map its fields
    pub async fn register<T: EntityClass>(&mut self) -> BehaviorResult<Arc<ClassMetadata>> {
        if let Some(metadata) = self.metadata.get(T::CLASS_NAME) {
            return Ok(metadata);
        }

        let mut metadata = ClassMetadata::for_class::<T>();
        self.events.dispatch_load_class_metadata(&mut metadata).await?;
        info!(
            "Registered entity class {} ({} mapped fields)",
            metadata.name(),
            metadata.fields().len()
        );
        Ok(self.metadata.insert(metadata))
    }

    /// Track a new entity; it is inserted on the next flush
    pub async fn persist<T: EntityClass>(&mut self, entity: T) -> BehaviorResult<EntityHandle> {
        let metadata = self.register::<T>().await?;

        let offered = Capabilities::offered_by(&entity);
        if offered != metadata.capabilities() {
            warn!(
                "{} declares {:?} but its entities offer {:?}; behaviors only map declared capabilities",
                metadata.name(),
                metadata.capabilities(),
                offered
            );
        }

        let handle = self
            .unit_of_work
            .schedule_for_insert(Box::new(entity), metadata);

        if let Err(e) = self
            .events
            .dispatch_lifecycle(Events::PrePersist, handle, &mut self.unit_of_work)
            .await
        {
            self.unit_of_work.schedule_for_delete(handle)?;
            return Err(e);
        }
        Ok(handle)
    }

    /// Persist an already tracked entity again, cancelling a scheduled deletion
    pub async fn persist_handle(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        let was_scheduled = self.unit_of_work.is_scheduled_for_insert(handle);
        self.unit_of_work.persist(handle)?;

        if !was_scheduled && self.unit_of_work.is_scheduled_for_insert(handle) {
            self.events
                .dispatch_lifecycle(Events::PrePersist, handle, &mut self.unit_of_work)
                .await?;
        }
        Ok(())
    }

    /// Schedule a managed entity for deletion
    ///
    /// A pending insertion is unscheduled instead and no event is raised.
    pub async fn remove(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        if self.unit_of_work.state(handle)? == EntityState::Managed {
            self.events
                .dispatch_lifecycle(Events::PreRemove, handle, &mut self.unit_of_work)
                .await?;
        }
        self.unit_of_work.schedule_for_delete(handle)
    }

    /// Look an entity up by identifier, from the identity map or the store
    pub async fn find<T: EntityClass>(&mut self, id: EntityId) -> BehaviorResult<Option<EntityHandle>> {
        let metadata = self.register::<T>().await?;
        if let Some(handle) = self.unit_of_work.try_get_by_id(metadata.name(), id) {
            return Ok(Some(handle));
        }

        match self.store.find(&metadata, id).await? {
            Some(row) => {
                let entity = Self::hydrate::<T>(&metadata, &row)?;
                Ok(Some(self.unit_of_work.register_managed(entity, metadata)?))
            }
            None => Ok(None),
        }
    }

    /// Entities of `T` matching the query, ordered by identifier
    pub async fn filter<T: EntityClass>(
        &mut self,
        query: &FilterQuery,
    ) -> BehaviorResult<Vec<EntityHandle>> {
        let metadata = self.register::<T>().await?;
        let rows = self.store.select(&metadata, query).await?;

        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = Self::hydrate::<T>(&metadata, &row)?;
            let handle = self
                .unit_of_work
                .register_managed(entity, Arc::clone(&metadata))?;
            handles.push(handle);
        }
        Ok(handles)
    }

    pub async fn count<T: EntityClass>(&mut self, query: &FilterQuery) -> BehaviorResult<u64> {
        let metadata = self.register::<T>().await?;
        self.store.count(&metadata, query).await
    }

    pub fn get<T: EntityClass>(&self, handle: EntityHandle) -> BehaviorResult<&T> {
        self.unit_of_work
            .entity(handle)?
            .downcast_ref::<T>()
            .ok_or_else(|| BehaviorError::UnknownEntity(T::CLASS_NAME.to_string()))
    }

    pub fn get_mut<T: EntityClass>(&mut self, handle: EntityHandle) -> BehaviorResult<&mut T> {
        self.unit_of_work
            .entity_mut(handle)?
            .downcast_mut::<T>()
            .ok_or_else(|| BehaviorError::UnknownEntity(T::CLASS_NAME.to_string()))
    }

    /// Forget every tracked entity; needed after a failed flush
    pub fn clear(&mut self) {
        self.unit_of_work = UnitOfWork::new();
    }

    /// Write every pending change in one store transaction
    pub async fn flush(&mut self) -> BehaviorResult<()> {
        self.unit_of_work.compute_change_sets()?;
        self.events.dispatch_on_flush(&mut self.unit_of_work).await?;

        if !self.unit_of_work.has_pending_work() {
            debug!("Nothing to flush");
            return Ok(());
        }

        self.store.begin().await?;
        match self.write_pending().await {
            Ok(()) => {
                self.store.commit().await?;
                self.unit_of_work.commit_cleanup();
                debug!("Flush committed");
                Ok(())
            }
            Err(e) => {
                warn!("Flush failed, rolling back: {}", e);
                if let Err(rollback_error) = self.store.rollback().await {
                    warn!("Rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    async fn write_pending(&mut self) -> BehaviorResult<()> {
        let insertions = self.unit_of_work.scheduled_entity_insertions().to_vec();
        for handle in insertions {
            let metadata = self.unit_of_work.metadata(handle)?;
            let values = metadata.entity_values(self.unit_of_work.entity(handle)?);
            let id = self.store.insert(&metadata, &values).await?;
            self.unit_of_work.mark_inserted(handle, id)?;
            debug!("Inserted {} {} as {}", metadata.name(), handle, id);

            self.events
                .dispatch_lifecycle(Events::PostPersist, handle, &mut self.unit_of_work)
                .await?;
        }

        let updates = self.unit_of_work.scheduled_entity_updates().to_vec();
        for handle in updates {
            self.events
                .dispatch_lifecycle(Events::PreUpdate, handle, &mut self.unit_of_work)
                .await?;
            self.unit_of_work.compute_change_set(handle)?;

            let (metadata, id) = self.identify(handle)?;
            let values = metadata.mapped_values(&self.unit_of_work.entity_change_set(handle).new_values());
            if !values.is_empty() {
                self.store.update(&metadata, id, &values).await?;
                debug!("Updated {} #{} ({} fields)", metadata.name(), id, values.len());
            }

            self.events
                .dispatch_lifecycle(Events::PostUpdate, handle, &mut self.unit_of_work)
                .await?;
        }

        let extra_updates = self.unit_of_work.extra_updates().to_vec();
        for (handle, changes) in extra_updates {
            let (metadata, id) = self.identify(handle)?;
            let values = metadata.mapped_values(&changes.new_values());
            if !values.is_empty() {
                self.store.update(&metadata, id, &values).await?;
            }
        }

        let deletions = self.unit_of_work.scheduled_entity_deletions().to_vec();
        for handle in deletions {
            let (metadata, id) = self.identify(handle)?;
            self.store.delete(&metadata, id).await?;
            self.unit_of_work.mark_deleted(handle)?;
            debug!("Deleted {} #{}", metadata.name(), id);

            self.events
                .dispatch_lifecycle(Events::PostRemove, handle, &mut self.unit_of_work)
                .await?;
        }
        Ok(())
    }

    fn hydrate<T: EntityClass>(
        metadata: &ClassMetadata,
        row: &Fields,
    ) -> BehaviorResult<Box<dyn Entity>> {
        let mut entity: Box<dyn Entity> = Box::new(T::from_fields(row)?);
        metadata.hydrate_behaviors(entity.as_mut(), row)?;
        Ok(entity)
    }

    fn identify(&self, handle: EntityHandle) -> BehaviorResult<(Arc<ClassMetadata>, EntityId)> {
        let metadata = self.unit_of_work.metadata(handle)?;
        let id = self.unit_of_work.entity(handle)?.id().ok_or_else(|| {
            BehaviorError::store(format!("{} {} has no identifier", metadata.name(), handle))
        })?;
        Ok((metadata, id))
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("events", &self.events)
            .field("metadata", &self.metadata.len())
            .field("unit_of_work", &self.unit_of_work)
            .finish()
    }
}
