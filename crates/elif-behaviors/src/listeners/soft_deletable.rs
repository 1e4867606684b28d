//! Soft-deletable listener - turns deletions into a `deleted_at` stamp

use async_trait::async_trait;
use tracing::debug;

use crate::config::BehaviorsConfig;
use crate::entity::{datetime_value, ChangeSet};
use crate::error::BehaviorResult;
use crate::events::{EventListener, LoadClassMetadataEventArgs, OnFlushEventArgs};
use crate::metadata::{FieldMapping, FieldType};

pub struct SoftDeletableListener {
    deleted_at_field: String,
}

impl SoftDeletableListener {
    pub fn new(config: &BehaviorsConfig) -> Self {
        Self {
            deleted_at_field: config.deleted_at_field.clone(),
        }
    }
}

#[async_trait]
impl EventListener for SoftDeletableListener {
    async fn load_class_metadata(
        &self,
        args: &mut LoadClassMetadataEventArgs<'_>,
    ) -> BehaviorResult<()> {
        if !args.class_metadata().capabilities().soft_deletable {
            return Ok(());
        }

        let metadata = args.class_metadata_mut();
        metadata.set_deleted_at_field(&self.deleted_at_field);
        if !metadata.has_field(&self.deleted_at_field) {
            metadata.map_field(
                FieldMapping::new(&self.deleted_at_field, FieldType::DateTime).nullable(),
            );
        }
        Ok(())
    }

    /// Stamp every scheduled soft-deletable deletion and write it as an update
    async fn on_flush(&self, args: &mut OnFlushEventArgs<'_>) -> BehaviorResult<()> {
        let unit_of_work = args.unit_of_work_mut();
        let deletions = unit_of_work.scheduled_entity_deletions().to_vec();

        for handle in deletions {
            let (old, new) = {
                let entity = unit_of_work.entity_mut(handle)?;
                let Some(deletable) = entity.as_soft_deletable_mut() else {
                    continue;
                };
                let old = deletable.deleted_at();
                deletable.delete();
                (datetime_value(old), datetime_value(deletable.deleted_at()))
            };

            unit_of_work.persist(handle)?;
            unit_of_work.property_changed(handle, &self.deleted_at_field, old.clone(), new.clone())?;
            unit_of_work.schedule_extra_update(
                handle,
                ChangeSet::new().with_change(self.deleted_at_field.as_str(), old, new),
            )?;
            debug!("Entity {} soft deleted", handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::listeners::fixtures::{Plain, Post};
    use crate::metadata::{Capabilities, ClassMetadata};
    use crate::unit_of_work::{EntityState, UnitOfWork};
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_maps_deleted_at_on_soft_deletable_classes() {
        let listener = SoftDeletableListener::new(&BehaviorsConfig::default());

        let mut metadata = ClassMetadata::new("Note", "notes")
            .with_capabilities(Capabilities::none().soft_deletable());
        listener
            .load_class_metadata(&mut LoadClassMetadataEventArgs::new(&mut metadata))
            .await
            .unwrap();

        let mapping = metadata.field("deleted_at").unwrap();
        assert_eq!(mapping.field_type, FieldType::DateTime);
        assert!(mapping.nullable);
        assert_eq!(metadata.deleted_at_field(), Some("deleted_at"));
    }

    #[tokio::test]
    async fn test_deletion_becomes_extra_update() {
        let listener = SoftDeletableListener::new(&BehaviorsConfig::default());
        let mut uow = UnitOfWork::new();
        let post = Post {
            id: Some(EntityId(5)),
            title: "Gone".to_string(),
            ..Post::default()
        };
        let handle = uow
            .register_managed(Box::new(post), Arc::new(Post::metadata()))
            .unwrap();
        uow.schedule_for_delete(handle).unwrap();

        listener
            .on_flush(&mut OnFlushEventArgs::new(&mut uow))
            .await
            .unwrap();

        assert!(!uow.is_scheduled_for_delete(handle));
        assert_eq!(uow.state(handle).unwrap(), EntityState::Managed);
        assert!(uow.is_scheduled_for_dirty_check(handle));

        let extra = uow.extra_updates();
        assert_eq!(extra.len(), 1);
        let change = extra[0].1.get("deleted_at").unwrap();
        assert_eq!(change.old, Value::Null);
        assert!(change.new.is_string());

        let entity = uow.entity(handle).unwrap().downcast_ref::<Post>().unwrap();
        assert!(entity.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_hard_deletions_are_untouched() {
        let listener = SoftDeletableListener::new(&BehaviorsConfig::default());
        let mut uow = UnitOfWork::new();
        let handle = uow
            .register_managed(
                Box::new(Plain {
                    id: Some(EntityId(1)),
                    slug: None,
                }),
                Arc::new(ClassMetadata::new("Plain", "plains")),
            )
            .unwrap();
        uow.schedule_for_delete(handle).unwrap();

        listener
            .on_flush(&mut OnFlushEventArgs::new(&mut uow))
            .await
            .unwrap();

        assert!(uow.is_scheduled_for_delete(handle));
        assert!(uow.extra_updates().is_empty());
    }
}
