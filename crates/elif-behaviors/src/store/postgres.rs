//! PostgreSQL store on top of sqlx
//!
//! Writes issued between `begin` and `commit` run inside one sqlx
//! transaction; everything else runs on the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Pool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use super::EntityStore;
use crate::entity::{datetime_value, EntityId, Fields};
use crate::error::{BehaviorError, BehaviorResult};
use crate::filter::{FilterQuery, SqlParameter};
use crate::metadata::{ClassMetadata, FieldMapping, FieldType};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

pub struct PgStore {
    pool: Pool<Postgres>,
    transaction: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            transaction: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for a class
    pub fn create_table_sql(metadata: &ClassMetadata) -> String {
        let mut columns = vec![format!("{} BIGSERIAL PRIMARY KEY", metadata.identifier())];
        for mapping in metadata.fields() {
            let null = if mapping.nullable { "" } else { " NOT NULL" };
            columns.push(format!(
                "{} {}{}",
                mapping.column_name, mapping.field_type, null
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            metadata.table_name(),
            columns.join(", ")
        )
    }

    /// Create the table of a class if it does not exist yet
    pub async fn ensure_table(&self, metadata: &ClassMetadata) -> BehaviorResult<()> {
        let sql = Self::create_table_sql(metadata);
        debug!("Ensuring table: {}", sql);
        self.execute(sqlx::query(&sql)).await?;
        Ok(())
    }

    async fn execute(&self, query: PgQuery<'_>) -> BehaviorResult<u64> {
        let mut transaction = self.transaction.lock().await;
        let result = match transaction.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, query: PgQuery<'_>) -> BehaviorResult<Vec<PgRow>> {
        let mut transaction = self.transaction.lock().await;
        let rows = match transaction.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await?,
            None => query.fetch_all(&self.pool).await?,
        };
        Ok(rows)
    }

    async fn fetch_one(&self, query: PgQuery<'_>) -> BehaviorResult<PgRow> {
        let mut transaction = self.transaction.lock().await;
        let row = match transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await?,
            None => query.fetch_one(&self.pool).await?,
        };
        Ok(row)
    }

    fn bind_parameters<'q>(
        mut query: PgQuery<'q>,
        metadata: &ClassMetadata,
        params: &[SqlParameter],
    ) -> BehaviorResult<PgQuery<'q>> {
        for param in params {
            let bound = if param.textual {
                BindValue::pattern(&param.value)
            } else {
                BindValue::for_column(metadata.field(&param.field), &param.value)?
            };
            query = bound.bind(query);
        }
        Ok(query)
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

/// Typed bind argument chosen from a column mapping and a JSON value
#[derive(Debug, Clone, PartialEq)]
enum BindValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Float(f64),
    Boolean(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Value),
}

impl BindValue {
    fn for_column(mapping: Option<&FieldMapping>, value: &Value) -> BehaviorResult<Self> {
        let field_type = mapping.map(|m| m.field_type);

        let bound = match (field_type, value) {
            (Some(FieldType::Json), value) => BindValue::Json(value.clone()),
            (Some(FieldType::Integer), Value::Null) => BindValue::Integer(None),
            (Some(FieldType::Boolean), Value::Null) => BindValue::Boolean(None),
            (Some(FieldType::DateTime), Value::Null) => BindValue::Timestamp(None),
            (_, Value::Null) => BindValue::Text(None),
            (Some(FieldType::DateTime), Value::String(text)) => {
                let at = DateTime::parse_from_rfc3339(text).map_err(|e| {
                    BehaviorError::store(format!("invalid timestamp '{}': {}", text, e))
                })?;
                BindValue::Timestamp(Some(at.with_timezone(&Utc)))
            }
            (Some(FieldType::Integer), Value::String(text)) => {
                let number = text.trim().parse::<i64>().map_err(|_| {
                    BehaviorError::store(format!("invalid integer '{}'", text))
                })?;
                BindValue::Integer(Some(number))
            }
            (_, Value::String(text)) => BindValue::Text(Some(text.clone())),
            (_, Value::Bool(flag)) => BindValue::Boolean(Some(*flag)),
            (_, Value::Number(number)) => match number.as_i64() {
                Some(int) => BindValue::Integer(Some(int)),
                None => BindValue::Float(number.as_f64().unwrap_or_default()),
            },
            (_, other) => BindValue::Json(other.clone()),
        };
        Ok(bound)
    }

    /// LIKE operands compare against the text form of the column
    fn pattern(value: &Value) -> Self {
        match value {
            Value::Null => BindValue::Text(None),
            Value::String(text) => BindValue::Text(Some(text.clone())),
            other => BindValue::Text(Some(other.to_string())),
        }
    }

    fn bind(self, query: PgQuery<'_>) -> PgQuery<'_> {
        match self {
            BindValue::Text(text) => query.bind(text),
            BindValue::Integer(number) => query.bind(number),
            BindValue::Float(number) => query.bind(number),
            BindValue::Boolean(flag) => query.bind(flag),
            BindValue::Timestamp(at) => query.bind(at),
            BindValue::Json(value) => query.bind(value),
        }
    }
}

fn bind_values<'q>(
    mut query: PgQuery<'q>,
    mappings: &[&FieldMapping],
    values: &Fields,
) -> BehaviorResult<PgQuery<'q>> {
    for mapping in mappings {
        let value = values.get(&mapping.field_name).unwrap_or(&Value::Null);
        query = BindValue::for_column(Some(mapping), value)?.bind(query);
    }
    Ok(query)
}

/// Decode a row into mapped field values, identifier included
fn decode_row(metadata: &ClassMetadata, row: &PgRow) -> BehaviorResult<Fields> {
    let mut fields = Fields::new();
    let id: i64 = row.try_get(metadata.identifier())?;
    fields.insert(metadata.identifier().to_string(), Value::from(id));

    for mapping in metadata.fields() {
        let column = mapping.column_name.as_str();
        let value = match mapping.field_type {
            FieldType::String | FieldType::Text => row
                .try_get::<Option<String>, _>(column)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            FieldType::Integer => row
                .try_get::<Option<i64>, _>(column)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            FieldType::Boolean => row
                .try_get::<Option<bool>, _>(column)?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            FieldType::DateTime => datetime_value(row.try_get::<Option<DateTime<Utc>>, _>(column)?),
            FieldType::Json => row
                .try_get::<Option<Value>, _>(column)?
                .unwrap_or(Value::Null),
        };
        fields.insert(mapping.field_name.clone(), value);
    }
    Ok(fields)
}

/// Mapped (column, field) pairs of `values`, in field order
fn mapped_columns<'m>(metadata: &'m ClassMetadata, values: &Fields) -> Vec<&'m FieldMapping> {
    metadata
        .fields()
        .iter()
        .filter(|mapping| values.contains_key(&mapping.field_name))
        .collect()
}

/// `INSERT ... RETURNING id` for the given columns
fn insert_sql(metadata: &ClassMetadata, mappings: &[&FieldMapping]) -> String {
    if mappings.is_empty() {
        return format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            metadata.table_name(),
            metadata.identifier()
        );
    }

    let columns: Vec<&str> = mappings.iter().map(|m| m.column_name.as_str()).collect();
    let placeholders: Vec<String> = (1..=mappings.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        metadata.table_name(),
        columns.join(", "),
        placeholders.join(", "),
        metadata.identifier()
    )
}

/// `UPDATE` of the given columns; the identifier is the last parameter
fn update_sql(metadata: &ClassMetadata, mappings: &[&FieldMapping]) -> String {
    let assignments: Vec<String> = mappings
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{} = ${}", m.column_name, i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        metadata.table_name(),
        assignments.join(", "),
        metadata.identifier(),
        mappings.len() + 1
    )
}

fn delete_sql(metadata: &ClassMetadata) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        metadata.table_name(),
        metadata.identifier()
    )
}

fn find_sql(metadata: &ClassMetadata) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = $1",
        metadata.table_name(),
        metadata.identifier()
    )
}

#[async_trait]
impl EntityStore for PgStore {
    async fn begin(&self) -> BehaviorResult<()> {
        let mut transaction = self.transaction.lock().await;
        if transaction.is_some() {
            return Err(BehaviorError::store("transaction already open"));
        }
        *transaction = Some(self.pool.begin().await?);
        debug!("PostgreSQL transaction started");
        Ok(())
    }

    async fn commit(&self) -> BehaviorResult<()> {
        let tx = self
            .transaction
            .lock()
            .await
            .take()
            .ok_or_else(|| BehaviorError::store("no transaction to commit"))?;
        tx.commit().await?;
        debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> BehaviorResult<()> {
        let tx = self.transaction.lock().await.take();
        if let Some(tx) = tx {
            tx.rollback().await?;
            debug!("PostgreSQL transaction rolled back");
        }
        Ok(())
    }

    async fn insert(&self, metadata: &ClassMetadata, values: &Fields) -> BehaviorResult<EntityId> {
        let mappings = mapped_columns(metadata, values);
        let sql = insert_sql(metadata, &mappings);

        let query = bind_values(sqlx::query(&sql), &mappings, values)?;
        let row = self.fetch_one(query).await?;
        let id: i64 = row.try_get(metadata.identifier())?;
        Ok(EntityId(id))
    }

    async fn update(
        &self,
        metadata: &ClassMetadata,
        id: EntityId,
        values: &Fields,
    ) -> BehaviorResult<()> {
        let mappings = mapped_columns(metadata, values);
        if mappings.is_empty() {
            return Ok(());
        }

        let sql = update_sql(metadata, &mappings);
        let query = bind_values(sqlx::query(&sql), &mappings, values)?.bind(id.value());

        if self.execute(query).await? == 0 {
            return Err(BehaviorError::NotFound {
                table: metadata.table_name().to_string(),
                id: id.value(),
            });
        }
        Ok(())
    }

    async fn delete(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<()> {
        let sql = delete_sql(metadata);

        if self.execute(sqlx::query(&sql).bind(id.value())).await? == 0 {
            return Err(BehaviorError::NotFound {
                table: metadata.table_name().to_string(),
                id: id.value(),
            });
        }
        Ok(())
    }

    async fn find(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<Option<Fields>> {
        let sql = find_sql(metadata);

        let rows = self.fetch_all(sqlx::query(&sql).bind(id.value())).await?;
        rows.first().map(|row| decode_row(metadata, row)).transpose()
    }

    async fn select(
        &self,
        metadata: &ClassMetadata,
        query: &FilterQuery,
    ) -> BehaviorResult<Vec<Fields>> {
        let (sql, params) = query.to_select_sql(metadata);
        debug!("Filter query: {}", sql);

        let bound = Self::bind_parameters(sqlx::query(&sql), metadata, &params)?;
        let rows = self.fetch_all(bound).await?;
        rows.iter().map(|row| decode_row(metadata, row)).collect()
    }

    async fn count(&self, metadata: &ClassMetadata, query: &FilterQuery) -> BehaviorResult<u64> {
        let (sql, params) = query.to_count_sql(metadata);

        let bound = Self::bind_parameters(sqlx::query(&sql), metadata, &params)?;
        let row = self.fetch_one(bound).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }
}
