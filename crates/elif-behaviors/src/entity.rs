//! Entity contract - what the unit of work needs to know about a record
//!
//! Entities are handled as `Box<dyn Entity>` once they enter a unit of work.
//! Capability traits (`Sluggable`, `SoftDeletable`, `Loggable`) are reached
//! through the `as_*` accessors, which return `None` unless the entity opts in.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;

use crate::contract::{Loggable, Sluggable, SoftDeletable};
use crate::error::{BehaviorError, BehaviorResult};
use crate::metadata::{Capabilities, FieldMapping};

/// Field name to value pairs, as written to and read from a store
pub type Fields = BTreeMap<String, Value>;

/// Store-assigned identifier of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Old and new value of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    pub fn new(old: Value, new: Value) -> Self {
        Self { old, new }
    }

    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

/// Mapping from field name to its (old, new) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. A field changed twice keeps its first old value.
    pub fn record(&mut self, field: impl Into<String>, old: Value, new: Value) {
        let field = field.into();
        match self.changes.get_mut(&field) {
            Some(existing) => existing.new = new,
            None => {
                self.changes.insert(field, FieldChange::new(old, new));
            }
        }
    }

    pub fn with_change(mut self, field: impl Into<String>, old: Value, new: Value) -> Self {
        self.record(field, old, new);
        self
    }

    pub fn merge(&mut self, other: ChangeSet) {
        for (field, change) in other.changes {
            self.record(field, change.old, change.new);
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.changes.iter()
    }

    /// New values only, as written by an UPDATE
    pub fn new_values(&self) -> Fields {
        self.changes
            .iter()
            .map(|(field, change)| (field.clone(), change.new.clone()))
            .collect()
    }
}

/// Blanket downcasting support for entities
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A record managed by the unit of work
pub trait Entity: AsAny + Debug + Send + Sync {
    /// Class name used in metadata lookups and log messages
    fn class_name(&self) -> &'static str;

    /// Identifier, `None` until the record has been inserted
    fn id(&self) -> Option<EntityId>;

    fn set_id(&mut self, id: EntityId);

    /// Current persistent state of the entity
    fn to_fields(&self) -> Fields;

    fn field(&self, name: &str) -> Option<Value> {
        self.to_fields().remove(name)
    }

    fn as_sluggable(&self) -> Option<&dyn Sluggable> {
        None
    }

    fn as_sluggable_mut(&mut self) -> Option<&mut dyn Sluggable> {
        None
    }

    fn as_soft_deletable(&self) -> Option<&dyn SoftDeletable> {
        None
    }

    fn as_soft_deletable_mut(&mut self) -> Option<&mut dyn SoftDeletable> {
        None
    }

    fn as_loggable(&self) -> Option<&dyn Loggable> {
        None
    }
}

impl dyn Entity + '_ {
    pub fn is<T: Entity + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Entity + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Entity + 'static>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Static description of an entity type, used to build its class metadata
pub trait EntityClass: Entity + Sized + 'static {
    const CLASS_NAME: &'static str;

    fn table_name() -> &'static str;

    /// Mapped fields, identifier excluded
    fn fields() -> Vec<FieldMapping>;

    fn capabilities() -> Capabilities {
        Capabilities::default()
    }

    /// Rebuild an entity from a stored row (identifier included)
    fn from_fields(fields: &Fields) -> BehaviorResult<Self>;
}

/// Serialize a timestamp the way stores and change sets carry it
pub fn datetime_value(value: Option<DateTime<Utc>>) -> Value {
    match value {
        Some(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        None => Value::Null,
    }
}

pub fn id_field(fields: &Fields) -> BehaviorResult<Option<EntityId>> {
    match fields.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(|id| Some(EntityId(id)))
            .ok_or_else(|| BehaviorError::hydration(format!("id is not an integer: {}", value))),
    }
}

pub fn string_field(fields: &Fields, name: &str) -> BehaviorResult<String> {
    optional_string_field(fields, name)?
        .ok_or_else(|| BehaviorError::hydration(format!("missing string field '{}'", name)))
}

pub fn optional_string_field(fields: &Fields, name: &str) -> BehaviorResult<Option<String>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(BehaviorError::hydration(format!(
            "field '{}' is not a string: {}",
            name, other
        ))),
    }
}

pub fn i64_field(fields: &Fields, name: &str) -> BehaviorResult<i64> {
    fields
        .get(name)
        .and_then(|value| match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        })
        .ok_or_else(|| BehaviorError::hydration(format!("missing integer field '{}'", name)))
}

pub fn datetime_field(fields: &Fields, name: &str) -> BehaviorResult<Option<DateTime<Utc>>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| BehaviorError::hydration(format!("field '{}': {}", name, e))),
        Some(other) => Err(BehaviorError::hydration(format!(
            "field '{}' is not a timestamp: {}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_set_keeps_first_old_value() {
        let mut changes = ChangeSet::new();
        changes.record("title", json!("a"), json!("b"));
        changes.record("title", json!("b"), json!("c"));

        let change = changes.get("title").unwrap();
        assert_eq!(change.old, json!("a"));
        assert_eq!(change.new, json!("c"));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_change_set_new_values() {
        let changes = ChangeSet::new()
            .with_change("title", json!("a"), json!("b"))
            .with_change("deleted_at", Value::Null, json!("2024-01-01T00:00:00.000000Z"));

        let values = changes.new_values();
        assert_eq!(values.get("title"), Some(&json!("b")));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_field_helpers() {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), json!(4));
        fields.insert("title".to_string(), json!("Hello"));
        fields.insert("code".to_string(), json!("20"));
        fields.insert("deleted_at".to_string(), Value::Null);

        assert_eq!(id_field(&fields).unwrap(), Some(EntityId(4)));
        assert_eq!(string_field(&fields, "title").unwrap(), "Hello");
        assert_eq!(i64_field(&fields, "code").unwrap(), 20);
        assert!(datetime_field(&fields, "deleted_at").unwrap().is_none());
        assert!(string_field(&fields, "missing").is_err());
    }

    #[test]
    fn test_datetime_round_trip_keeps_microseconds() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:20:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut fields = Fields::new();
        fields.insert("deleted_at".to_string(), datetime_value(Some(at)));

        assert_eq!(datetime_field(&fields, "deleted_at").unwrap(), Some(at));
    }
}
