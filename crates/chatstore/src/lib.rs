//! Keyed-record store the encryption tooling reads from and writes back to.
//! - [`Store`]: fetch by predicate, insert, update by id.
//! - [`MemoryStore`] for tests, [`RestStore`] for the hosted PostgREST API.

use std::sync::Arc;

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod query;
pub mod rest;
pub mod row;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{Filter, Order, Query};
pub use rest::RestStore;
pub use row::{MessageRow, Row, RowId, MESSAGES_TABLE, MINDFULNESS_TABLE, PROFILES_TABLE};

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert and return the stored row, including generated columns.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    async fn update_by_id(&self, table: &str, id: &RowId, fields: Row) -> Result<(), StoreError>;

    async fn fetch_all(&self, table: &str, order_by: Option<&str>) -> Result<Vec<Row>, StoreError> {
        let query = match order_by {
            Some(col) => Query::new().order_asc(col),
            None => Query::new(),
        };
        self.fetch(table, &query).await
    }

    async fn fetch_where(&self, table: &str, filters: Vec<Filter>) -> Result<Vec<Row>, StoreError> {
        let query = Query {
            filters,
            ..Query::default()
        };
        self.fetch(table, &query).await
    }
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn fetch(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        (**self).fetch(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        (**self).insert(table, row).await
    }

    async fn update_by_id(&self, table: &str, id: &RowId, fields: Row) -> Result<(), StoreError> {
        (**self).update_by_id(table, id, fields).await
    }
}
