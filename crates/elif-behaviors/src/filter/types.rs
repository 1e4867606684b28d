//! Filter query types

use serde_json::Value;
use std::fmt;

/// Predicate operators a filter can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Like,
    /// Case-insensitive LIKE, rendered as `LOWER(col) LIKE LOWER(param)`
    ILike,
    In,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOperator::Equal => write!(f, "="),
            FilterOperator::NotEqual => write!(f, "!="),
            FilterOperator::Like => write!(f, "LIKE"),
            FilterOperator::ILike => write!(f, "ILIKE"),
            FilterOperator::In => write!(f, "IN"),
        }
    }
}

/// How a condition joins the conditions before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => write!(f, "AND"),
            Conjunction::Or => write!(f, "OR"),
        }
    }
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Selector as given by the caller, e.g. `e:name`
    pub selector: String,
    /// Alias part of the selector, if any
    pub alias: Option<String>,
    /// Field part of the selector
    pub field: String,
    /// Parameter name, e.g. `e_name`
    pub parameter: String,
    pub operator: FilterOperator,
    pub value: Option<Value>,
    pub values: Vec<Value>, // For IN
    pub conjunction: Conjunction,
}

impl FilterCondition {
    pub fn new(selector: &str, operator: FilterOperator, conjunction: Conjunction) -> Self {
        let (alias, field) = match selector.split_once([':', '.']) {
            Some((alias, field)) => (Some(alias.to_string()), field.to_string()),
            None => (None, selector.to_string()),
        };

        Self {
            selector: selector.to_string(),
            alias,
            field,
            parameter: selector.replace([':', '.'], "_"),
            operator,
            value: None,
            values: Vec::new(),
            conjunction,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }

    /// Column expression, e.g. `e.name`
    pub fn column(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{}", alias, self.field),
            None => self.field.clone(),
        }
    }
}
