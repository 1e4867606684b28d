//! Class metadata - mapped fields and capabilities of entity classes
//!
//! Metadata is built from `EntityClass` once per class, handed to every
//! listener through the `load_class_metadata` event (where behaviors map
//! their extra fields) and then frozen behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::entity::{
    datetime_field, datetime_value, optional_string_field, Entity, EntityClass, Fields,
};
use crate::error::BehaviorResult;

/// Column types understood by the stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Text,
    Integer,
    Boolean,
    DateTime,
    Json,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "VARCHAR(255)"),
            FieldType::Text => write!(f, "TEXT"),
            FieldType::Integer => write!(f, "BIGINT"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::DateTime => write!(f, "TIMESTAMPTZ"),
            FieldType::Json => write!(f, "JSONB"),
        }
    }
}

impl FieldType {
    /// Stored as character data
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Text)
    }
}

/// A mapped field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub field_name: String,
    pub column_name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl FieldMapping {
    pub fn new(field_name: &str, field_type: FieldType) -> Self {
        Self {
            field_name: field_name.to_string(),
            column_name: field_name.to_string(),
            field_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn column(mut self, column_name: &str) -> Self {
        self.column_name = column_name.to_string();
        self
    }
}

/// Behaviors a class opts into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub sluggable: bool,
    pub soft_deletable: bool,
    pub loggable: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn sluggable(mut self) -> Self {
        self.sluggable = true;
        self
    }

    pub fn soft_deletable(mut self) -> Self {
        self.soft_deletable = true;
        self
    }

    pub fn loggable(mut self) -> Self {
        self.loggable = true;
        self
    }

    /// Capabilities an entity exposes through its `as_*` accessors
    pub fn offered_by(entity: &dyn Entity) -> Self {
        Self {
            sluggable: entity.as_sluggable().is_some(),
            soft_deletable: entity.as_soft_deletable().is_some(),
            loggable: entity.as_loggable().is_some(),
        }
    }
}

/// Mapping information of one entity class
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    name: String,
    table_name: String,
    identifier: String,
    fields: Vec<FieldMapping>,
    capabilities: Capabilities,
    slug_field: Option<String>,
    deleted_at_field: Option<String>,
}

impl ClassMetadata {
    pub fn new(name: &str, table_name: &str) -> Self {
        Self {
            name: name.to_string(),
            table_name: table_name.to_string(),
            identifier: "id".to_string(),
            fields: Vec::new(),
            capabilities: Capabilities::default(),
            slug_field: None,
            deleted_at_field: None,
        }
    }

    pub fn for_class<T: EntityClass>() -> Self {
        let mut metadata = Self::new(T::CLASS_NAME, T::table_name())
            .with_capabilities(T::capabilities());
        for mapping in T::fields() {
            metadata.map_field(mapping);
        }
        metadata
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.fields.iter().any(|f| f.field_name == field_name)
    }

    /// Map a field; an existing mapping with the same name is replaced
    pub fn map_field(&mut self, mapping: FieldMapping) {
        match self.fields.iter_mut().find(|f| f.field_name == mapping.field_name) {
            Some(existing) => *existing = mapping,
            None => self.fields.push(mapping),
        }
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn column_name(&self, field_name: &str) -> Option<&str> {
        if field_name == self.identifier {
            return Some(&self.identifier);
        }
        self.field(field_name).map(|f| f.column_name.as_str())
    }

    /// Keep only the mapped fields of `fields`, identifier excluded
    pub fn mapped_values(&self, fields: &Fields) -> Fields {
        fields
            .iter()
            .filter(|(name, _)| self.has_field(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Field holding the slug of a sluggable class
    pub fn slug_field(&self) -> Option<&str> {
        self.slug_field.as_deref()
    }

    pub fn set_slug_field(&mut self, field_name: &str) {
        self.slug_field = Some(field_name.to_string());
    }

    /// Field holding the deletion stamp of a soft-deletable class
    pub fn deleted_at_field(&self) -> Option<&str> {
        self.deleted_at_field.as_deref()
    }

    pub fn set_deleted_at_field(&mut self, field_name: &str) {
        self.deleted_at_field = Some(field_name.to_string());
    }

    /// Mapped values of an entity as they are written to the store
    ///
    /// Behavior fields are read through the capability accessors, so their
    /// configured names do not have to match the keys of `to_fields`.
    pub fn entity_values(&self, entity: &dyn Entity) -> Fields {
        let mut fields = entity.to_fields();

        if let (Some(field), Some(sluggable)) = (&self.slug_field, entity.as_sluggable()) {
            let slug = sluggable.slug().map(|s| Value::String(s.to_string()));
            fields.insert(field.clone(), slug.unwrap_or(Value::Null));
        }
        if let (Some(field), Some(deletable)) =
            (&self.deleted_at_field, entity.as_soft_deletable())
        {
            fields.insert(field.clone(), datetime_value(deletable.deleted_at()));
        }

        self.mapped_values(&fields)
    }

    /// Copy behavior fields of a stored row into a freshly built entity
    pub fn hydrate_behaviors(&self, entity: &mut dyn Entity, row: &Fields) -> BehaviorResult<()> {
        if let Some(field) = &self.slug_field {
            if let (Some(slug), Some(sluggable)) =
                (optional_string_field(row, field)?, entity.as_sluggable_mut())
            {
                sluggable.set_slug(slug);
            }
        }
        if let Some(field) = &self.deleted_at_field {
            let deleted_at = datetime_field(row, field)?;
            if let Some(deletable) = entity.as_soft_deletable_mut() {
                deletable.set_deleted_at(deleted_at);
            }
        }
        Ok(())
    }
}

/// Cache of loaded class metadata
#[derive(Debug, Default)]
pub struct MetadataFactory {
    loaded: HashMap<String, Arc<ClassMetadata>>,
}

impl MetadataFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class_name: &str) -> Option<Arc<ClassMetadata>> {
        self.loaded.get(class_name).cloned()
    }

    pub fn has_metadata_for(&self, class_name: &str) -> bool {
        self.loaded.contains_key(class_name)
    }

    pub fn insert(&mut self, metadata: ClassMetadata) -> Arc<ClassMetadata> {
        let metadata = Arc::new(metadata);
        self.loaded
            .insert(metadata.name().to_string(), Arc::clone(&metadata));
        metadata
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}
