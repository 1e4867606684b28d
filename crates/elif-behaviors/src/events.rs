//! Lifecycle events and listener dispatch
//!
//! Listeners receive every event and ignore the ones they do not care about,
//! the same way model observers do. Dispatch is sequential in registration
//! order and stops at the first error.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::entity::{ChangeSet, Entity};
use crate::error::BehaviorResult;
use crate::metadata::ClassMetadata;
use crate::unit_of_work::{EntityHandle, UnitOfWork};

/// Events dispatched by the entity manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Events {
    LoadClassMetadata,
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
    OnFlush,
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Events::LoadClassMetadata => "load_class_metadata",
            Events::PrePersist => "pre_persist",
            Events::PostPersist => "post_persist",
            Events::PreUpdate => "pre_update",
            Events::PostUpdate => "post_update",
            Events::PreRemove => "pre_remove",
            Events::PostRemove => "post_remove",
            Events::OnFlush => "on_flush",
        };
        write!(f, "{}", name)
    }
}

/// Arguments of `load_class_metadata`
pub struct LoadClassMetadataEventArgs<'a> {
    class_metadata: &'a mut ClassMetadata,
}

impl<'a> LoadClassMetadataEventArgs<'a> {
    pub fn new(class_metadata: &'a mut ClassMetadata) -> Self {
        Self { class_metadata }
    }

    pub fn class_metadata(&self) -> &ClassMetadata {
        self.class_metadata
    }

    pub fn class_metadata_mut(&mut self) -> &mut ClassMetadata {
        self.class_metadata
    }
}

/// Arguments of the per-entity lifecycle events
pub struct LifecycleEventArgs<'a> {
    handle: EntityHandle,
    unit_of_work: &'a mut UnitOfWork,
}

impl<'a> LifecycleEventArgs<'a> {
    pub fn new(handle: EntityHandle, unit_of_work: &'a mut UnitOfWork) -> Self {
        Self {
            handle,
            unit_of_work,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn entity(&self) -> BehaviorResult<&dyn Entity> {
        self.unit_of_work.entity(self.handle)
    }

    pub fn entity_mut(&mut self) -> BehaviorResult<&mut dyn Entity> {
        self.unit_of_work.entity_mut(self.handle)
    }

    pub fn class_metadata(&self) -> BehaviorResult<Arc<ClassMetadata>> {
        self.unit_of_work.metadata(self.handle)
    }

    /// Pending change set of the entity
    pub fn entity_change_set(&self) -> ChangeSet {
        self.unit_of_work.entity_change_set(self.handle)
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        self.unit_of_work
    }

    pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork {
        self.unit_of_work
    }
}

/// Arguments of `on_flush`
pub struct OnFlushEventArgs<'a> {
    unit_of_work: &'a mut UnitOfWork,
}

impl<'a> OnFlushEventArgs<'a> {
    pub fn new(unit_of_work: &'a mut UnitOfWork) -> Self {
        Self { unit_of_work }
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        self.unit_of_work
    }

    pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork {
        self.unit_of_work
    }
}

#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn load_class_metadata(
        &self,
        _args: &mut LoadClassMetadataEventArgs<'_>,
    ) -> BehaviorResult<()> {
        Ok(())
    }

    async fn pre_persist(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn post_persist(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn pre_update(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn post_update(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn pre_remove(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn post_remove(&self, _args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }

    async fn on_flush(&self, _args: &mut OnFlushEventArgs<'_>) -> BehaviorResult<()> {
        Ok(())
    }
}

/// Ordered set of listeners
#[derive(Clone, Default)]
pub struct EventManager {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub async fn dispatch_load_class_metadata(
        &self,
        class_metadata: &mut ClassMetadata,
    ) -> BehaviorResult<()> {
        for listener in &self.listeners {
            trace!("{} -> {}", Events::LoadClassMetadata, listener.name());
            let mut args = LoadClassMetadataEventArgs::new(class_metadata);
            listener.load_class_metadata(&mut args).await?;
        }
        Ok(())
    }

    /// Dispatch a per-entity lifecycle event
    pub async fn dispatch_lifecycle(
        &self,
        event: Events,
        handle: EntityHandle,
        unit_of_work: &mut UnitOfWork,
    ) -> BehaviorResult<()> {
        for listener in &self.listeners {
            trace!("{} {} -> {}", event, handle, listener.name());
            let mut args = LifecycleEventArgs::new(handle, unit_of_work);
            match event {
                Events::PrePersist => listener.pre_persist(&mut args).await?,
                Events::PostPersist => listener.post_persist(&mut args).await?,
                Events::PreUpdate => listener.pre_update(&mut args).await?,
                Events::PostUpdate => listener.post_update(&mut args).await?,
                Events::PreRemove => listener.pre_remove(&mut args).await?,
                Events::PostRemove => listener.post_remove(&mut args).await?,
                Events::LoadClassMetadata | Events::OnFlush => {}
            }
        }
        Ok(())
    }

    pub async fn dispatch_on_flush(&self, unit_of_work: &mut UnitOfWork) -> BehaviorResult<()> {
        for listener in &self.listeners {
            trace!("{} -> {}", Events::OnFlush, listener.name());
            let mut args = OnFlushEventArgs::new(unit_of_work);
            listener.on_flush(&mut args).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("EventManager").field("listeners", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BehaviorError;
    use crate::metadata::{Capabilities, FieldMapping, FieldType};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct EventTracker {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl EventTracker {
        fn track(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn get_events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    struct TrackingListener {
        label: &'static str,
        tracker: EventTracker,
    }

    #[async_trait]
    impl EventListener for TrackingListener {
        async fn load_class_metadata(
            &self,
            args: &mut LoadClassMetadataEventArgs<'_>,
        ) -> BehaviorResult<()> {
            self.tracker
                .track(format!("{}: load {}", self.label, args.class_metadata().name()));
            args.class_metadata_mut()
                .map_field(FieldMapping::new(self.label, FieldType::String));
            Ok(())
        }

        async fn on_flush(&self, _args: &mut OnFlushEventArgs<'_>) -> BehaviorResult<()> {
            self.tracker.track(format!("{}: flush", self.label));
            Ok(())
        }
    }

    struct FailingListener;

    #[async_trait]
    impl EventListener for FailingListener {
        async fn on_flush(&self, _args: &mut OnFlushEventArgs<'_>) -> BehaviorResult<()> {
            Err(BehaviorError::listener("flush refused"))
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Events::OnFlush.to_string(), "on_flush");
        assert_eq!(Events::LoadClassMetadata.to_string(), "load_class_metadata");
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let tracker = EventTracker::default();
        let manager = EventManager::new()
            .with_listener(Arc::new(TrackingListener {
                label: "first",
                tracker: tracker.clone(),
            }))
            .with_listener(Arc::new(TrackingListener {
                label: "second",
                tracker: tracker.clone(),
            }));

        let mut metadata =
            ClassMetadata::new("Post", "posts").with_capabilities(Capabilities::none());
        manager
            .dispatch_load_class_metadata(&mut metadata)
            .await
            .unwrap();

        let mut uow = UnitOfWork::new();
        manager.dispatch_on_flush(&mut uow).await.unwrap();

        assert_eq!(
            tracker.get_events(),
            vec!["first: load Post", "second: load Post", "first: flush", "second: flush"]
        );
        assert!(metadata.has_field("first"));
        assert!(metadata.has_field("second"));
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_error() {
        let tracker = EventTracker::default();
        let manager = EventManager::new()
            .with_listener(Arc::new(FailingListener))
            .with_listener(Arc::new(TrackingListener {
                label: "after",
                tracker: tracker.clone(),
            }));

        let mut uow = UnitOfWork::new();
        let result = manager.dispatch_on_flush(&mut uow).await;

        assert!(result.is_err());
        assert!(tracker.get_events().is_empty());
        assert_eq!(manager.listener_count(), 2);
    }
}
