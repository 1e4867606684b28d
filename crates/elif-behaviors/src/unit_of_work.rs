//! Unit of Work - pending inserts, updates and deletes of one transaction
//!
//! Entities enter the unit of work as boxed trait objects and are addressed
//! by `EntityHandle` afterwards. Handles stay valid for the lifetime of the
//! unit of work, even after the entity has been deleted and detached.
//!
//! Change tracking is snapshot based: the mapped values of an entity are
//! remembered when it is loaded or written, and `compute_change_set` diffs
//! the current values against that snapshot. Only values that reached the
//! store move the snapshot forward, so an edit that was never computed stays
//! pending for the next flush.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::entity::{ChangeSet, Entity, EntityId, Fields};
use crate::error::{BehaviorError, BehaviorResult};
use crate::metadata::ClassMetadata;

/// Address of an entity inside a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(usize);

impl EntityHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Persisted but not yet inserted
    New,
    /// In sync with (or loaded from) the store
    Managed,
    /// Scheduled for deletion
    Removed,
    /// No longer tracked; handle kept for inspection only
    Detached,
}

struct TrackedEntity {
    entity: Box<dyn Entity>,
    metadata: Arc<ClassMetadata>,
    state: EntityState,
    original: Option<Fields>,
}

/// In-memory record of everything a flush has to write
#[derive(Default)]
pub struct UnitOfWork {
    entries: Vec<TrackedEntity>,
    identity_map: HashMap<(String, EntityId), EntityHandle>,
    insertions: Vec<EntityHandle>,
    updates: Vec<EntityHandle>,
    deletions: Vec<EntityHandle>,
    change_sets: HashMap<EntityHandle, ChangeSet>,
    extra_updates: Vec<(EntityHandle, ChangeSet)>,
    dirty_checks: Vec<EntityHandle>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new entity and schedule its insertion
    pub fn schedule_for_insert(
        &mut self,
        entity: Box<dyn Entity>,
        metadata: Arc<ClassMetadata>,
    ) -> EntityHandle {
        let handle = EntityHandle(self.entries.len());
        self.entries.push(TrackedEntity {
            entity,
            metadata,
            state: EntityState::New,
            original: None,
        });
        self.insertions.push(handle);
        debug!("Scheduled entity {} for insertion", handle);
        handle
    }

    /// Track an entity read from the store
    ///
    /// Returns the existing handle when the identity map already knows the
    /// record; the passed entity is dropped in that case.
    pub fn register_managed(
        &mut self,
        entity: Box<dyn Entity>,
        metadata: Arc<ClassMetadata>,
    ) -> BehaviorResult<EntityHandle> {
        let id = entity
            .id()
            .ok_or_else(|| BehaviorError::hydration("managed entity without identifier"))?;

        if let Some(handle) = self.try_get_by_id(metadata.name(), id) {
            return Ok(handle);
        }

        let original = metadata.entity_values(entity.as_ref());
        let handle = EntityHandle(self.entries.len());
        self.identity_map
            .insert((metadata.name().to_string(), id), handle);
        self.entries.push(TrackedEntity {
            entity,
            metadata,
            state: EntityState::Managed,
            original: Some(original),
        });
        Ok(handle)
    }

    pub fn try_get_by_id(&self, class_name: &str, id: EntityId) -> Option<EntityHandle> {
        self.identity_map
            .get(&(class_name.to_string(), id))
            .copied()
    }

    fn tracked(&self, handle: EntityHandle) -> BehaviorResult<&TrackedEntity> {
        self.entries
            .get(handle.0)
            .ok_or(BehaviorError::UnknownHandle(handle.0))
    }

    fn tracked_mut(&mut self, handle: EntityHandle) -> BehaviorResult<&mut TrackedEntity> {
        self.entries
            .get_mut(handle.0)
            .ok_or(BehaviorError::UnknownHandle(handle.0))
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        handle.0 < self.entries.len()
    }

    pub fn entity(&self, handle: EntityHandle) -> BehaviorResult<&dyn Entity> {
        Ok(self.tracked(handle)?.entity.as_ref())
    }

    pub fn entity_mut(&mut self, handle: EntityHandle) -> BehaviorResult<&mut dyn Entity> {
        Ok(self.tracked_mut(handle)?.entity.as_mut())
    }

    pub fn metadata(&self, handle: EntityHandle) -> BehaviorResult<Arc<ClassMetadata>> {
        Ok(Arc::clone(&self.tracked(handle)?.metadata))
    }

    pub fn state(&self, handle: EntityHandle) -> BehaviorResult<EntityState> {
        Ok(self.tracked(handle)?.state)
    }

    /// Make an entity managed again; a scheduled deletion is cancelled
    pub fn persist(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        let (state, has_id) = {
            let tracked = self.tracked(handle)?;
            (tracked.state, tracked.entity.id().is_some())
        };

        match state {
            EntityState::New | EntityState::Managed => {}
            EntityState::Removed => {
                self.deletions.retain(|h| *h != handle);
                self.tracked_mut(handle)?.state = EntityState::Managed;
                debug!("Cancelled scheduled deletion of entity {}", handle);
            }
            EntityState::Detached if has_id => {
                self.tracked_mut(handle)?.state = EntityState::Managed;
                self.index_identity(handle)?;
            }
            EntityState::Detached => {
                let tracked = self.tracked_mut(handle)?;
                tracked.state = EntityState::New;
                tracked.original = None;
                self.insertions.push(handle);
            }
        }
        Ok(())
    }

    /// Schedule a deletion; a pending insertion is simply dropped
    pub fn schedule_for_delete(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        match self.state(handle)? {
            EntityState::New => {
                self.insertions.retain(|h| *h != handle);
                self.change_sets.remove(&handle);
                self.tracked_mut(handle)?.state = EntityState::Detached;
                debug!("Unscheduled insertion of entity {}", handle);
            }
            EntityState::Managed => {
                self.updates.retain(|h| *h != handle);
                self.deletions.push(handle);
                self.tracked_mut(handle)?.state = EntityState::Removed;
                debug!("Scheduled entity {} for deletion", handle);
            }
            EntityState::Removed => {}
            EntityState::Detached => {
                warn!("Ignoring removal of detached entity {}", handle);
            }
        }
        Ok(())
    }

    pub fn scheduled_entity_insertions(&self) -> &[EntityHandle] {
        &self.insertions
    }

    pub fn scheduled_entity_updates(&self) -> &[EntityHandle] {
        &self.updates
    }

    pub fn scheduled_entity_deletions(&self) -> &[EntityHandle] {
        &self.deletions
    }

    /// Insertions, then updates, then deletions, each in scheduling order
    pub fn scheduled_entities(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.insertions
            .iter()
            .chain(self.updates.iter())
            .chain(self.deletions.iter())
            .copied()
    }

    pub fn is_scheduled_for_insert(&self, handle: EntityHandle) -> bool {
        self.insertions.contains(&handle)
    }

    pub fn is_scheduled_for_update(&self, handle: EntityHandle) -> bool {
        self.updates.contains(&handle)
    }

    pub fn is_scheduled_for_delete(&self, handle: EntityHandle) -> bool {
        self.deletions.contains(&handle)
    }

    pub fn has_pending_work(&self) -> bool {
        !self.insertions.is_empty()
            || !self.updates.is_empty()
            || !self.deletions.is_empty()
            || !self.extra_updates.is_empty()
    }

    /// Handles of entities currently in sync with the store
    pub fn managed_handles(&self) -> Vec<EntityHandle> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, tracked)| tracked.state == EntityState::Managed)
            .map(|(index, _)| EntityHandle(index))
            .collect()
    }

    /// Diff every pending insertion and managed entity against its snapshot
    pub fn compute_change_sets(&mut self) -> BehaviorResult<()> {
        let insertions = self.insertions.clone();
        for handle in insertions {
            self.compute_change_set(handle)?;
        }

        for handle in self.managed_handles() {
            self.compute_change_set(handle)?;
        }
        Ok(())
    }

    /// Diff one entity against its snapshot
    ///
    /// New changes are merged into the entity's change set and become the new
    /// snapshot. A managed entity with changes is scheduled for update.
    pub fn compute_change_set(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        let (state, diff, actual) = {
            let tracked = self.tracked(handle)?;
            let actual = tracked.metadata.entity_values(tracked.entity.as_ref());
            let empty = Fields::new();
            let original = tracked.original.as_ref().unwrap_or(&empty);

            let mut diff = ChangeSet::new();
            for (field, value) in &actual {
                let old = original.get(field).cloned().unwrap_or(Value::Null);
                if &old != value {
                    diff.record(field.clone(), old, value.clone());
                }
            }
            (tracked.state, diff, actual)
        };

        self.tracked_mut(handle)?.original = Some(actual);

        if diff.is_empty() {
            return Ok(());
        }

        self.change_sets.entry(handle).or_default().merge(diff);

        if state == EntityState::Managed
            && !self.is_scheduled_for_update(handle)
            && !self.is_scheduled_for_delete(handle)
        {
            self.updates.push(handle);
            debug!("Scheduled entity {} for update", handle);
        }
        Ok(())
    }

    /// Change set of an entity; empty when nothing is pending
    pub fn entity_change_set(&self, handle: EntityHandle) -> ChangeSet {
        self.change_sets.get(&handle).cloned().unwrap_or_default()
    }

    /// Register a field change made behind the change tracker's back
    ///
    /// Unmapped fields are ignored. The entity is re-marked dirty.
    pub fn property_changed(
        &mut self,
        handle: EntityHandle,
        field: &str,
        old: Value,
        new: Value,
    ) -> BehaviorResult<()> {
        if !self.tracked(handle)?.metadata.has_field(field) {
            return Ok(());
        }

        self.change_sets
            .entry(handle)
            .or_default()
            .record(field, old, new);

        if !self.dirty_checks.contains(&handle) {
            self.dirty_checks.push(handle);
        }
        Ok(())
    }

    pub fn is_scheduled_for_dirty_check(&self, handle: EntityHandle) -> bool {
        self.dirty_checks.contains(&handle)
    }

    /// Write additional field values for an entity after the regular updates
    pub fn schedule_extra_update(
        &mut self,
        handle: EntityHandle,
        changes: ChangeSet,
    ) -> BehaviorResult<()> {
        self.tracked(handle)?;

        match self.extra_updates.iter_mut().find(|(h, _)| *h == handle) {
            Some((_, existing)) => existing.merge(changes),
            None => self.extra_updates.push((handle, changes)),
        }
        Ok(())
    }

    pub fn extra_updates(&self) -> &[(EntityHandle, ChangeSet)] {
        &self.extra_updates
    }

    /// Record the identifier assigned by the store
    pub fn mark_inserted(&mut self, handle: EntityHandle, id: EntityId) -> BehaviorResult<()> {
        let tracked = self.tracked_mut(handle)?;
        tracked.entity.set_id(id);
        tracked.state = EntityState::Managed;
        tracked.original = Some(tracked.metadata.entity_values(tracked.entity.as_ref()));
        self.index_identity(handle)
    }

    pub fn mark_deleted(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        let tracked = self.tracked_mut(handle)?;
        tracked.state = EntityState::Detached;
        let key = tracked
            .entity
            .id()
            .map(|id| (tracked.metadata.name().to_string(), id));

        if let Some(key) = key {
            self.identity_map.remove(&key);
        }
        Ok(())
    }

    fn index_identity(&mut self, handle: EntityHandle) -> BehaviorResult<()> {
        let tracked = self.tracked(handle)?;
        if let Some(id) = tracked.entity.id() {
            let key = (tracked.metadata.name().to_string(), id);
            self.identity_map.insert(key, handle);
        }
        Ok(())
    }

    /// Forget everything scheduled once the store has committed
    ///
    /// Extra updates are folded into the snapshots of their entities; other
    /// fields keep their last written value.
    pub fn commit_cleanup(&mut self) {
        for (handle, changes) in std::mem::take(&mut self.extra_updates) {
            let Some(tracked) = self.entries.get_mut(handle.0) else {
                continue;
            };
            let written = tracked.metadata.mapped_values(&changes.new_values());
            if let Some(original) = tracked.original.as_mut() {
                original.extend(written);
            }
        }

        self.insertions.clear();
        self.updates.clear();
        self.deletions.clear();
        self.change_sets.clear();
        self.dirty_checks.clear();
    }

    /// Number of tracked entities, detached ones included
    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("entities", &self.entries.len())
            .field("insertions", &self.insertions)
            .field("updates", &self.updates)
            .field("deletions", &self.deletions)
            .field("extra_updates", &self.extra_updates.len())
            .finish()
    }
}
