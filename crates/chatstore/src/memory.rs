//! In-process store. Used by tests and offline tooling.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::query::Query;
use crate::row::{Row, RowId};
use crate::Store;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    broken_tables: RwLock<HashSet<String>>,
    broken_rows: RwLock<HashSet<RowId>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a table's contents.
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables.write().await.insert(table.to_owned(), rows);
    }

    /// Snapshot of a table in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every read of `table` fail until [`MemoryStore::heal`].
    pub async fn break_reads(&self, table: &str) {
        self.broken_tables.write().await.insert(table.to_owned());
    }

    /// Make updates of this row id fail until [`MemoryStore::heal`].
    pub async fn break_writes(&self, id: RowId) {
        self.broken_rows.write().await.insert(id);
    }

    pub async fn heal(&self) {
        self.broken_tables.write().await.clear();
        self.broken_rows.write().await.clear();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        if self.broken_tables.read().await.contains(table) {
            return Err(StoreError::read(table, "table unavailable"));
        }
        Ok(query.apply(self.rows(table).await))
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        if self.broken_tables.read().await.contains(table) {
            return Err(StoreError::write(table, "<new>", "table unavailable"));
        }
        if RowId::of(&row).is_none() {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            row.insert("id".into(), Value::from(format!("mem-{id}")));
        }
        self.tables
            .write()
            .await
            .entry(table.to_owned())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update_by_id(&self, table: &str, id: &RowId, fields: Row) -> Result<(), StoreError> {
        if self.broken_rows.read().await.contains(id) {
            return Err(StoreError::write(table, id, "write rejected"));
        }
        let mut tables = self.tables.write().await;
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| RowId::of(r).as_ref() == Some(id)))
            .ok_or_else(|| StoreError::write(table, id, "no such row"))?;
        for (k, v) in fields {
            row.insert(k, v);
        }
        Ok(())
    }
}
