#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use elif_behaviors::{
    datetime_field, datetime_value, i64_field, id_field, optional_string_field, string_field,
    BehaviorResult, BehaviorsConfig, Capabilities, ChangeLogger, DefaultSluggableRepository,
    Entity, EntityClass, EntityId, EntityManager, EntityStore, FieldMapping, FieldType, Fields,
    Filterable, Loggable, LoggableListener, MemoryStore, Sluggable, SluggableListener,
    SoftDeletable, SoftDeletableListener,
};

/// Sluggable and loggable blog article
#[derive(Debug, Clone, Default)]
pub struct Article {
    pub id: Option<EntityId>,
    pub title: String,
    pub body: String,
    pub slug: Option<String>,
}

impl Article {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Article {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), json!(self.title));
        fields.insert("body".to_string(), json!(self.body));
        fields.insert(
            "slug".to_string(),
            self.slug.clone().map(Value::String).unwrap_or(Value::Null),
        );
        fields
    }

    fn as_sluggable(&self) -> Option<&dyn Sluggable> {
        Some(self)
    }

    fn as_sluggable_mut(&mut self) -> Option<&mut dyn Sluggable> {
        Some(self)
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        Some(self)
    }
}

impl EntityClass for Article {
    const CLASS_NAME: &'static str = "Article";

    fn table_name() -> &'static str {
        "articles"
    }

    fn fields() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("title", FieldType::String),
            FieldMapping::new("body", FieldType::Text),
        ]
    }

    fn capabilities() -> Capabilities {
        Capabilities::none().sluggable().loggable()
    }

    fn from_fields(fields: &Fields) -> BehaviorResult<Self> {
        Ok(Self {
            id: id_field(fields)?,
            title: string_field(fields, "title")?,
            body: string_field(fields, "body")?,
            slug: optional_string_field(fields, "slug")?,
        })
    }
}

impl Sluggable for Article {
    fn sluggable_fields(&self) -> Vec<&'static str> {
        vec!["title"]
    }

    fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    fn set_slug(&mut self, slug: String) {
        self.slug = Some(slug);
    }
}

impl Loggable for Article {}

/// Soft-deletable note
#[derive(Debug, Clone, Default)]
pub struct Note {
    pub id: Option<EntityId>,
    pub content: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Note {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("content".to_string(), json!(self.content));
        fields.insert("deleted_at".to_string(), datetime_value(self.deleted_at));
        fields
    }

    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        Some(self)
    }

    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        Some(self)
    }
}

impl EntityClass for Note {
    const CLASS_NAME: &'static str = "Note";

    fn table_name() -> &'static str {
        "notes"
    }

    fn fields() -> Vec<FieldMapping> {
        vec![FieldMapping::new("content", FieldType::Text)]
    }

    fn capabilities() -> Capabilities {
        Capabilities::none().soft_deletable()
    }

    fn from_fields(fields: &Fields) -> BehaviorResult<Self> {
        Ok(Self {
            id: id_field(fields)?,
            content: string_field(fields, "content")?,
            deleted_at: datetime_field(fields, "deleted_at")?,
        })
    }
}

impl SoftDeletable for Note {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, deleted_at: Option<DateTime<Utc>>) {
        self.deleted_at = deleted_at;
    }
}

/// Plain entity queried through a filterable repository
#[derive(Debug, Clone, Default)]
pub struct Product {
    pub id: Option<EntityId>,
    pub name: String,
    pub code: i64,
}

impl Product {
    pub fn new(code: i64, name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            code,
        }
    }
}

impl Entity for Product {
    fn class_name(&self) -> &'static str {
        Self::CLASS_NAME
    }

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!(self.name));
        fields.insert("code".to_string(), json!(self.code));
        fields
    }
}

impl EntityClass for Product {
    const CLASS_NAME: &'static str = "Product";

    fn table_name() -> &'static str {
        "products"
    }

    fn fields() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("name", FieldType::String),
            FieldMapping::new("code", FieldType::Integer),
        ]
    }

    fn from_fields(fields: &Fields) -> BehaviorResult<Self> {
        Ok(Self {
            id: id_field(fields)?,
            name: string_field(fields, "name")?,
            code: i64_field(fields, "code")?,
        })
    }
}

pub struct ProductRepository;

impl Filterable for ProductRepository {
    fn like_filter_columns(&self) -> Vec<&'static str> {
        vec!["e:name"]
    }

    fn equal_filter_columns(&self) -> Vec<&'static str> {
        vec!["e:code"]
    }
}

/// Change logger keeping every line in memory
#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap().clear();
    }
}

impl ChangeLogger for RecordingLogger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

/// Manager with every behavior, logging into a `RecordingLogger`
pub fn manager_with(store: Arc<MemoryStore>) -> (EntityManager, Arc<RecordingLogger>) {
    let config = BehaviorsConfig::default();
    let logger = Arc::new(RecordingLogger::default());
    let store: Arc<dyn EntityStore> = store;
    let repository = Arc::new(DefaultSluggableRepository::new(
        Arc::clone(&store),
        &config.slug_field,
    ));

    let manager = EntityManager::new(store)
        .with_listener(Arc::new(SluggableListener::new(&config, repository)))
        .with_listener(Arc::new(SoftDeletableListener::new(&config)))
        .with_listener(Arc::new(LoggableListener::with_logger(logger.clone())));

    (manager, logger)
}
