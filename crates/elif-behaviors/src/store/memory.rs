//! In-memory store backed by DashMap
//!
//! Tables live in a `DashMap` keyed by table name. `begin` takes a copy of
//! every table and `rollback` puts it back, which is enough transactional
//! behavior for one writer at a time.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

use super::EntityStore;
use crate::entity::{EntityId, Fields};
use crate::error::{BehaviorError, BehaviorResult};
use crate::filter::FilterQuery;
use crate::metadata::ClassMetadata;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<i64, Fields>,
    last_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: DashMap<String, Table>,
    snapshot: Mutex<Option<HashMap<String, Table>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored in `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.snapshot.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn take_snapshot(&self) -> BehaviorResult<Option<HashMap<String, Table>>> {
        let mut snapshot = self
            .snapshot
            .lock()
            .map_err(|_| BehaviorError::store("snapshot lock poisoned"))?;
        Ok(snapshot.take())
    }

    fn row_with_id(metadata: &ClassMetadata, id: i64, values: &Fields) -> Fields {
        let mut row = values.clone();
        row.insert(metadata.identifier().to_string(), Value::from(id));
        row
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> BehaviorResult<()> {
        let mut snapshot = self
            .snapshot
            .lock()
            .map_err(|_| BehaviorError::store("snapshot lock poisoned"))?;
        if snapshot.is_some() {
            return Err(BehaviorError::store("transaction already open"));
        }

        let copy = self
            .tables
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        *snapshot = Some(copy);
        debug!("Memory store transaction started");
        Ok(())
    }

    async fn commit(&self) -> BehaviorResult<()> {
        match self.take_snapshot()? {
            Some(_) => {
                debug!("Memory store transaction committed");
                Ok(())
            }
            None => Err(BehaviorError::store("no transaction to commit")),
        }
    }

    async fn rollback(&self) -> BehaviorResult<()> {
        let Some(tables) = self.take_snapshot()? else {
            return Ok(());
        };

        self.tables.clear();
        for (name, table) in tables {
            self.tables.insert(name, table);
        }
        debug!("Memory store transaction rolled back");
        Ok(())
    }

    async fn insert(&self, metadata: &ClassMetadata, values: &Fields) -> BehaviorResult<EntityId> {
        let mut table = self
            .tables
            .entry(metadata.table_name().to_string())
            .or_default();

        table.last_id += 1;
        let id = table.last_id;
        let row = Self::row_with_id(metadata, id, &metadata.mapped_values(values));
        table.rows.insert(id, row);
        Ok(EntityId(id))
    }

    async fn update(
        &self,
        metadata: &ClassMetadata,
        id: EntityId,
        values: &Fields,
    ) -> BehaviorResult<()> {
        let not_found = || BehaviorError::NotFound {
            table: metadata.table_name().to_string(),
            id: id.value(),
        };

        let mut table = self
            .tables
            .get_mut(metadata.table_name())
            .ok_or_else(not_found)?;
        let row = table.rows.get_mut(&id.value()).ok_or_else(not_found)?;

        for (field, value) in metadata.mapped_values(values) {
            row.insert(field, value);
        }
        Ok(())
    }

    async fn delete(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<()> {
        let removed = self
            .tables
            .get_mut(metadata.table_name())
            .and_then(|mut table| table.rows.remove(&id.value()));

        match removed {
            Some(_) => Ok(()),
            None => Err(BehaviorError::NotFound {
                table: metadata.table_name().to_string(),
                id: id.value(),
            }),
        }
    }

    async fn find(&self, metadata: &ClassMetadata, id: EntityId) -> BehaviorResult<Option<Fields>> {
        Ok(self
            .tables
            .get(metadata.table_name())
            .and_then(|table| table.rows.get(&id.value()).cloned()))
    }

    async fn select(
        &self,
        metadata: &ClassMetadata,
        query: &FilterQuery,
    ) -> BehaviorResult<Vec<Fields>> {
        Ok(self
            .tables
            .get(metadata.table_name())
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|row| query.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, metadata: &ClassMetadata, query: &FilterQuery) -> BehaviorResult<u64> {
        Ok(self
            .tables
            .get(metadata.table_name())
            .map(|table| table.rows.values().filter(|row| query.matches(row)).count() as u64)
            .unwrap_or(0))
    }
}
