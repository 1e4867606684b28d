//! Sluggable listener - generates slugs and keeps them unique

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::BehaviorsConfig;
use crate::error::{BehaviorError, BehaviorResult};
use crate::events::{EventListener, LifecycleEventArgs, LoadClassMetadataEventArgs};
use crate::metadata::{FieldMapping, FieldType};
use crate::repository::SluggableRepository;
use crate::unit_of_work::{EntityHandle, UnitOfWork};

/// Maps the slug field and negotiates a unique slug on persist and update
///
/// A candidate is free when the store has no other record with it and no
/// other sluggable entity scheduled in the unit of work carries it. Taken
/// candidates get a numeric suffix: `hello`, `hello-1`, `hello-2`, ...
pub struct SluggableListener {
    repository: Arc<dyn SluggableRepository>,
    slug_field: String,
    separator: String,
    max_attempts: Option<u32>,
}

impl SluggableListener {
    pub fn new(config: &BehaviorsConfig, repository: Arc<dyn SluggableRepository>) -> Self {
        Self {
            repository,
            slug_field: config.slug_field.clone(),
            separator: config.slug_suffix_separator.clone(),
            max_attempts: config.max_slug_attempts,
        }
    }

    async fn process(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        let (base, id) = {
            let entity = args.entity_mut()?;
            let Some(sluggable) = entity.as_sluggable_mut() else {
                return Ok(());
            };

            sluggable.generate_slug()?;
            if !sluggable.should_generate_unique_slugs() {
                return Ok(());
            }
            (sluggable.slug().unwrap_or_default().to_string(), sluggable.id())
        };

        let metadata = args.class_metadata()?;
        let handle = args.handle();
        let mut candidate = base.clone();
        let mut probes: u32 = 1;

        loop {
            if self
                .repository
                .is_slug_unique_for(&metadata, id, &candidate)
                .await?
                && is_slug_unique_in_unit_of_work(args.unit_of_work(), handle, &candidate)
            {
                break;
            }

            if let Some(max) = self.max_attempts {
                if probes >= max {
                    return Err(BehaviorError::SlugExhausted {
                        slug: base,
                        attempts: probes,
                    });
                }
            }

            candidate = format!("{}{}{}", base, self.separator, probes);
            probes += 1;
        }

        if candidate != base {
            debug!("Slug '{}' taken, using '{}' for entity {}", base, candidate, handle);
        }

        if let Some(sluggable) = args.entity_mut()?.as_sluggable_mut() {
            sluggable.set_slug(candidate);
        }
        Ok(())
    }
}

/// No other scheduled sluggable entity carries `slug`
fn is_slug_unique_in_unit_of_work(
    unit_of_work: &UnitOfWork,
    own: EntityHandle,
    slug: &str,
) -> bool {
    unit_of_work
        .scheduled_entities()
        .filter(|handle| *handle != own)
        .filter_map(|handle| unit_of_work.entity(handle).ok())
        .filter_map(|entity| entity.as_sluggable())
        .all(|other| other.slug() != Some(slug))
}

#[async_trait]
impl EventListener for SluggableListener {
    async fn load_class_metadata(
        &self,
        args: &mut LoadClassMetadataEventArgs<'_>,
    ) -> BehaviorResult<()> {
        if !args.class_metadata().capabilities().sluggable {
            return Ok(());
        }

        let metadata = args.class_metadata_mut();
        metadata.set_slug_field(&self.slug_field);
        if !metadata.has_field(&self.slug_field) {
            metadata.map_field(FieldMapping::new(&self.slug_field, FieldType::String).nullable());
        }
        Ok(())
    }

    async fn pre_persist(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        self.process(args).await
    }

    async fn pre_update(&self, args: &mut LifecycleEventArgs<'_>) -> BehaviorResult<()> {
        self.process(args).await
    }
}
