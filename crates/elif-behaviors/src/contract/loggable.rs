//! Loggable capability

use serde_json::Value;

use crate::entity::{ChangeSet, Entity};
use crate::error::BehaviorResult;

/// Entity able to describe its own creation, changes and removal
///
/// Renderers return errors instead of panicking; an error aborts the flush
/// that triggered it.
pub trait Loggable: Entity {
    fn create_log_message(&self) -> BehaviorResult<String> {
        Ok(format!("{} #{} created", self.class_name(), display_id(self)))
    }

    /// One line per field whose value visibly changed; empty when nothing did
    ///
    /// Scalar changes that render to the same text, such as `null` to `""`,
    /// are left out.
    fn update_log_message(&self, change_set: &ChangeSet) -> BehaviorResult<String> {
        let lines: Vec<String> = change_set
            .iter()
            .filter(|(_, change)| !change.is_noop() && !renders_same(&change.old, &change.new))
            .map(|(field, change)| {
                format!(
                    "{} #{} : property \"{}\" changed from \"{}\" to \"{}\"",
                    self.class_name(),
                    display_id(self),
                    field,
                    display_value(&change.old),
                    display_value(&change.new)
                )
            })
            .collect();

        Ok(lines.join("\n"))
    }

    fn remove_log_message(&self) -> BehaviorResult<String> {
        Ok(format!("{} #{} removed", self.class_name(), display_id(self)))
    }
}

fn display_id<E: Entity + ?Sized>(entity: &E) -> String {
    entity.id().map(|id| id.to_string()).unwrap_or_default()
}

fn renders_same(old: &Value, new: &Value) -> bool {
    let compound = |value: &Value| matches!(value, Value::Array(_) | Value::Object(_));
    !compound(old) && !compound(new) && display_value(old) == display_value(new)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => "an array".to_string(),
        other => other.to_string(),
    }
}
