//! Sluggable capability

use serde_json::Value;

use crate::entity::Entity;
use crate::error::{BehaviorError, BehaviorResult};
use crate::slug::slugify;

/// Entity carrying a URL-safe identifier derived from one or more label fields
pub trait Sluggable: Entity {
    /// Fields whose values make up the slug, in order
    fn sluggable_fields(&self) -> Vec<&'static str>;

    fn slug(&self) -> Option<&str>;

    fn set_slug(&mut self, slug: String);

    fn should_generate_unique_slugs(&self) -> bool {
        true
    }

    fn should_regenerate_slug_on_update(&self) -> bool {
        true
    }

    fn slug_delimiter(&self) -> &str {
        "-"
    }

    /// Rebuild the slug from the sluggable fields
    ///
    /// Empty values are skipped; at least one field must carry a value and
    /// the normalized slug must not be empty.
    fn generate_slug(&mut self) -> BehaviorResult<()> {
        if self.slug().is_some() && !self.should_regenerate_slug_on_update() {
            return Ok(());
        }

        let fields = self.sluggable_fields();
        let usable: Vec<String> = fields
            .iter()
            .filter_map(|field| self.field(field))
            .filter_map(|value| label_value(&value))
            .filter(|value| !value.is_empty())
            .collect();

        if usable.is_empty() {
            return Err(BehaviorError::Sluggable(format!(
                "Sluggable expects to have at least one non-empty field from the following: [\"{}\"]",
                fields.join("\", \"")
            )));
        }

        let slug = slugify(&usable.join(" "), self.slug_delimiter());
        if slug.is_empty() {
            return Err(BehaviorError::Sluggable(format!(
                "Sluggable could not build a slug from the following fields: [\"{}\"]",
                fields.join("\", \"")
            )));
        }

        self.set_slug(slug);
        Ok(())
    }
}

fn label_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, Fields};
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Page {
        id: Option<EntityId>,
        title: String,
        section: Option<String>,
        slug: Option<String>,
        frozen: bool,
    }

    impl Entity for Page {
        fn class_name(&self) -> &'static str {
            "Page"
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
            fields.insert("section".to_string(), json!(self.section));
            fields.insert("slug".to_string(), json!(self.slug));
            fields
        }
    }

    impl Sluggable for Page {
        fn sluggable_fields(&self) -> Vec<&'static str> {
            vec!["section", "title"]
        }

        fn slug(&self) -> Option<&str> {
            self.slug.as_deref()
        }

        fn set_slug(&mut self, slug: String) {
            self.slug = Some(slug);
        }

        fn should_regenerate_slug_on_update(&self) -> bool {
            !self.frozen
        }
    }

    #[test]
    fn test_generate_slug_joins_usable_fields() {
        let mut page = Page {
            title: "Getting Started".to_string(),
            section: Some("Docs".to_string()),
            ..Default::default()
        };

        page.generate_slug().unwrap();
        assert_eq!(page.slug(), Some("docs-getting-started"));
    }

    #[test]
    fn test_generate_slug_skips_empty_fields() {
        let mut page = Page {
            title: "Getting Started".to_string(),
            section: Some(String::new()),
            ..Default::default()
        };

        page.generate_slug().unwrap();
        assert_eq!(page.slug(), Some("getting-started"));
    }

    #[test]
    fn test_generate_slug_requires_a_value() {
        let mut page = Page::default();

        let result = page.generate_slug();
        match result {
            Err(BehaviorError::Sluggable(message)) => {
                assert!(message.contains("\"section\", \"title\""));
            }
            other => panic!("Expected sluggable error, got {:?}", other),
        }
        assert!(page.slug().is_none());
    }

    #[test]
    fn test_generate_slug_transliterates_labels() {
        let mut page = Page {
            title: "Привет мир".to_string(),
            ..Default::default()
        };

        page.generate_slug().unwrap();
        assert_eq!(page.slug(), Some("privet-mir"));
    }

    #[test]
    fn test_generate_slug_rejects_punctuation_only_label() {
        let mut page = Page {
            title: "!!!".to_string(),
            ..Default::default()
        };

        match page.generate_slug() {
            Err(BehaviorError::Sluggable(message)) => {
                assert!(message.contains("could not build a slug"));
            }
            other => panic!("Expected sluggable error, got {:?}", other),
        }
        assert!(page.slug().is_none());
    }

    #[test]
    fn test_frozen_slug_is_not_regenerated() {
        let mut page = Page {
            title: "New Title".to_string(),
            slug: Some("old-title".to_string()),
            frozen: true,
            ..Default::default()
        };

        page.generate_slug().unwrap();
        assert_eq!(page.slug(), Some("old-title"));
    }
}
