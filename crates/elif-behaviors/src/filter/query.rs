//! Filter query builder, SQL rendering and in-memory evaluation
//!
//! Conditions are combined left to right: `a AND b OR c` means
//! `(a AND b) OR c`, the same grouping chained `and_where`/`or_where` calls
//! produce in a query builder.

use serde_json::Value;

use super::types::*;
use crate::entity::Fields;
use crate::metadata::ClassMetadata;

/// A bound parameter of a rendered filter query
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    /// Field the value is compared against, used to pick the bind type
    pub field: String,
    pub value: Value,
    /// Pattern operand, always bound as text
    pub textual: bool,
}

/// Ordered list of filter conditions on one entity class
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    alias: String,
    conditions: Vec<FilterCondition>,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self::new("e")
    }
}

impl FilterQuery {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            conditions: Vec::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn push(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, selector: &str, value: T) -> Self {
        self.push(
            FilterCondition::new(selector, FilterOperator::Equal, Conjunction::And)
                .with_value(value.into()),
        )
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<T: Into<Value>>(self, selector: &str, value: T) -> Self {
        self.push(
            FilterCondition::new(selector, FilterOperator::NotEqual, Conjunction::And)
                .with_value(value.into()),
        )
    }

    /// Add WHERE condition with LIKE; `%` and `_` are wildcards
    pub fn where_like(self, selector: &str, pattern: &str) -> Self {
        self.push(
            FilterCondition::new(selector, FilterOperator::Like, Conjunction::And)
                .with_value(Value::String(pattern.to_string())),
        )
    }

    /// Add case-insensitive LIKE condition
    pub fn where_ilike(self, selector: &str, pattern: &str) -> Self {
        self.push(
            FilterCondition::new(selector, FilterOperator::ILike, Conjunction::And)
                .with_value(Value::String(pattern.to_string())),
        )
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(self, selector: &str, values: Vec<T>) -> Self {
        self.push(
            FilterCondition::new(selector, FilterOperator::In, Conjunction::And)
                .with_values(values.into_iter().map(|v| v.into()).collect()),
        )
    }

    /// Render `SELECT alias.* FROM table alias WHERE ... ORDER BY alias.id`
    pub fn to_select_sql(&self, metadata: &ClassMetadata) -> (String, Vec<SqlParameter>) {
        let mut sql = format!(
            "SELECT {alias}.* FROM {table} {alias}",
            alias = self.alias,
            table = metadata.table_name()
        );
        let params = self.push_where_clause(&mut sql, metadata);
        sql.push_str(&format!(
            " ORDER BY {}.{} ASC",
            self.alias,
            metadata.identifier()
        ));
        (sql, params)
    }

    /// Render `SELECT COUNT(*) FROM table alias WHERE ...`
    pub fn to_count_sql(&self, metadata: &ClassMetadata) -> (String, Vec<SqlParameter>) {
        let mut sql = format!(
            "SELECT COUNT(*) FROM {table} {alias}",
            alias = self.alias,
            table = metadata.table_name()
        );
        let params = self.push_where_clause(&mut sql, metadata);
        (sql, params)
    }

    fn push_where_clause(&self, sql: &mut String, metadata: &ClassMetadata) -> Vec<SqlParameter> {
        let mut params = Vec::new();
        let mut conditions = self.conditions.iter();

        let Some(first) = conditions.next() else {
            return params;
        };

        let mut clause = self.condition_sql(first, metadata, &mut params);
        let mut compound = false;
        let mut mixed = false;

        for condition in conditions {
            let wrap = match condition.conjunction {
                Conjunction::Or => compound,
                Conjunction::And => mixed,
            };
            if wrap {
                clause = format!("({})", clause);
                mixed = false;
            }

            let rendered = self.condition_sql(condition, metadata, &mut params);
            clause = format!("{} {} {}", clause, condition.conjunction, rendered);
            compound = true;
            if condition.conjunction == Conjunction::Or {
                mixed = true;
            }
        }

        sql.push_str(" WHERE ");
        sql.push_str(&clause);
        params
    }

    fn condition_sql(
        &self,
        condition: &FilterCondition,
        metadata: &ClassMetadata,
        params: &mut Vec<SqlParameter>,
    ) -> String {
        let alias = condition.alias.as_deref().unwrap_or(&self.alias);
        let column = metadata
            .column_name(&condition.field)
            .unwrap_or(condition.field.as_str());
        let column = format!("{}.{}", alias, column);
        let pattern = matches!(condition.operator, FilterOperator::Like | FilterOperator::ILike);
        let textual_column = metadata
            .field(&condition.field)
            .map_or(false, |mapping| mapping.field_type.is_textual());

        let mut bind = |value: &Value| {
            params.push(SqlParameter {
                field: condition.field.clone(),
                value: value.clone(),
                textual: pattern,
            });
            format!("${}", params.len())
        };

        // Patterns compare text, so other column types are cast first
        let pattern_column = if textual_column {
            column.clone()
        } else {
            format!("{}::text", column)
        };

        let single = condition.value.clone().unwrap_or(Value::Null);
        match condition.operator {
            FilterOperator::Equal | FilterOperator::NotEqual => {
                let placeholder = bind(&single);
                format!("{} {} {}", column, condition.operator, placeholder)
            }
            FilterOperator::Like => {
                let placeholder = bind(&single);
                format!("{} LIKE {}", pattern_column, placeholder)
            }
            FilterOperator::ILike => {
                let placeholder = bind(&single);
                format!("LOWER({}) LIKE LOWER({})", pattern_column, placeholder)
            }
            FilterOperator::In if condition.values.is_empty() => "1 = 0".to_string(),
            FilterOperator::In => {
                let placeholders: Vec<String> = condition.values.iter().map(&mut bind).collect();
                format!("{} IN ({})", column, placeholders.join(", "))
            }
        }
    }

    /// Evaluate the query against a stored row
    pub fn matches(&self, row: &Fields) -> bool {
        let mut result: Option<bool> = None;

        for condition in &self.conditions {
            let matched = condition_matches(condition, row);
            result = Some(match (result, condition.conjunction) {
                (None, _) => matched,
                (Some(acc), Conjunction::And) => acc && matched,
                (Some(acc), Conjunction::Or) => acc || matched,
            });
        }

        result.unwrap_or(true)
    }
}

fn condition_matches(condition: &FilterCondition, row: &Fields) -> bool {
    let actual = row.get(&condition.field).unwrap_or(&Value::Null);
    if actual.is_null() {
        return false;
    }

    let expected = condition.value.as_ref().unwrap_or(&Value::Null);
    match condition.operator {
        FilterOperator::Equal => loosely_equal(actual, expected),
        FilterOperator::NotEqual => !expected.is_null() && !loosely_equal(actual, expected),
        FilterOperator::Like => like_match(&text_of(actual), &text_of(expected)),
        FilterOperator::ILike => like_match(
            &text_of(actual).to_lowercase(),
            &text_of(expected).to_lowercase(),
        ),
        FilterOperator::In => condition.values.iter().any(|v| loosely_equal(actual, v)),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Equality with the numeric/text coercion a database applies to literals
fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }

    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => false,
    }
}

/// SQL LIKE matching: `%` is any run, `_` any single character
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}
