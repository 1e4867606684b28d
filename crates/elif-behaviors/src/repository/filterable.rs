//! Filter-by-map query building for repositories
//!
//! A repository lists which selectors are matched with LIKE, case-insensitive
//! LIKE, equality or IN. `filter_by` turns a map of selector to value into a
//! `FilterQuery`, skipping empty values and selectors no list mentions.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::filter::{Conjunction, FilterCondition, FilterOperator, FilterQuery};

/// Selector (e.g. `e:name`) to filter value
pub type Filters = BTreeMap<String, Value>;

pub trait Filterable {
    /// Alias of the root entity in built queries
    fn filter_alias(&self) -> &str {
        "e"
    }

    fn like_filter_columns(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn ilike_filter_columns(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn equal_filter_columns(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn in_filter_columns(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// How successive predicates are combined
    fn where_operator(&self) -> Conjunction {
        Conjunction::And
    }

    fn create_filter_query(&self) -> FilterQuery {
        FilterQuery::new(self.filter_alias())
    }

    /// Append one predicate per non-empty filter to `query` (or a new query)
    fn filter_by(&self, filters: &Filters, query: Option<FilterQuery>) -> FilterQuery {
        let mut query = query.unwrap_or_else(|| self.create_filter_query());

        let ilike = self.ilike_filter_columns();
        let like = self.like_filter_columns();
        let equal = self.equal_filter_columns();
        let within = self.in_filter_columns();

        for (selector, value) in filters {
            if is_empty_filter(value) {
                continue;
            }
            let selector = selector.as_str();

            let condition = if is_listed(ilike.as_slice(), selector) {
                FilterCondition::new(selector, FilterOperator::ILike, self.where_operator())
                    .with_value(contains_pattern(value))
            } else if is_listed(like.as_slice(), selector) {
                FilterCondition::new(selector, FilterOperator::Like, self.where_operator())
                    .with_value(contains_pattern(value))
            } else if is_listed(equal.as_slice(), selector) {
                FilterCondition::new(selector, FilterOperator::Equal, self.where_operator())
                    .with_value(value.clone())
            } else if is_listed(within.as_slice(), selector) {
                let values = match value {
                    Value::Array(items) => items.clone(),
                    single => vec![single.clone()],
                };
                FilterCondition::new(selector, FilterOperator::In, self.where_operator())
                    .with_values(values)
            } else {
                continue;
            };

            query = query.push(condition);
        }

        query
    }
}

fn is_listed(columns: &[&str], selector: &str) -> bool {
    columns.iter().any(|column| *column == selector)
}

fn is_empty_filter(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn contains_pattern(value: &Value) -> Value {
    let text = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Value::String(format!("%{}%", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ProductRepository {
        operator: Conjunction,
    }

    impl Filterable for ProductRepository {
        fn like_filter_columns(&self) -> Vec<&'static str> {
            vec!["e:name"]
        }

        fn ilike_filter_columns(&self) -> Vec<&'static str> {
            vec!["e:label"]
        }

        fn equal_filter_columns(&self) -> Vec<&'static str> {
            vec!["e:code"]
        }

        fn in_filter_columns(&self) -> Vec<&'static str> {
            vec!["e:status"]
        }

        fn where_operator(&self) -> Conjunction {
            self.operator
        }
    }

    fn filters(pairs: &[(&str, Value)]) -> Filters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_operator_per_column_list() {
        let repository = ProductRepository {
            operator: Conjunction::And,
        };
        let query = repository.filter_by(
            &filters(&[
                ("e:name", json!("name")),
                ("e:label", json!("Name")),
                ("e:code", json!("2")),
                ("e:status", json!(["draft", "live"])),
            ]),
            None,
        );

        let conditions = query.conditions();
        assert_eq!(conditions.len(), 4);

        let by_field = |field: &str| conditions.iter().find(|c| c.field == field).unwrap();
        assert_eq!(by_field("name").operator, FilterOperator::Like);
        assert_eq!(by_field("name").value, Some(json!("%name%")));
        assert_eq!(by_field("label").operator, FilterOperator::ILike);
        assert_eq!(by_field("code").operator, FilterOperator::Equal);
        assert_eq!(by_field("code").parameter, "e_code");
        assert_eq!(by_field("status").values.len(), 2);
    }

    #[test]
    fn test_empty_and_unknown_filters_are_skipped() {
        let repository = ProductRepository {
            operator: Conjunction::And,
        };
        let query = repository.filter_by(
            &filters(&[
                ("e:name", json!("")),
                ("e:code", Value::Null),
                ("e:status", json!([])),
                ("e:unknown", json!("x")),
            ]),
            None,
        );

        assert!(query.is_empty());
        assert_eq!(query.alias(), "e");
    }

    #[test]
    fn test_where_operator_applies_to_each_predicate() {
        let repository = ProductRepository {
            operator: Conjunction::Or,
        };
        let query = repository.filter_by(
            &filters(&[("e:name", json!("a")), ("e:code", json!(3))]),
            None,
        );

        assert!(query
            .conditions()
            .iter()
            .all(|c| c.conjunction == Conjunction::Or));
    }

    #[test]
    fn test_appends_to_existing_query() {
        let repository = ProductRepository {
            operator: Conjunction::And,
        };
        let base = FilterQuery::new("e").where_ne("e:code", 40);
        let query = repository.filter_by(&filters(&[("e:name", json!("name"))]), Some(base));

        assert_eq!(query.conditions().len(), 2);
        assert_eq!(query.conditions()[0].operator, FilterOperator::NotEqual);
    }
}
