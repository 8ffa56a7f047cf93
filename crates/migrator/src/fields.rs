//! Per-user field encryption for tables outside the chat.
//!
//! Same idempotent skip-or-encrypt walk as the message migration, but each
//! row is keyed by its owner's user key under the `user-data` context, and a
//! row may carry several columns to protect.

use chatcrypt::{is_envelope, Codec};
use chatstore::{Row, RowId, Store, MINDFULNESS_TABLE, PROFILES_TABLE};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::MigrationError;
use crate::report::{FieldMigrationReport, RowFailure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMigration {
    pub table: String,
    /// Column holding the user id whose key protects the row.
    pub owner_column: String,
    /// Ascending read order, so a re-run walks rows the same way.
    pub order_column: String,
    pub fields: Vec<String>,
}

impl FieldMigration {
    pub fn mindfulness_entries() -> Self {
        Self {
            table: MINDFULNESS_TABLE.to_owned(),
            owner_column: "user_id".to_owned(),
            order_column: "created_at".to_owned(),
            fields: vec!["content".to_owned()],
        }
    }

    pub fn profiles() -> Self {
        Self {
            table: PROFILES_TABLE.to_owned(),
            owner_column: "id".to_owned(),
            order_column: "id".to_owned(),
            fields: vec!["dob".to_owned(), "location".to_owned(), "gender".to_owned()],
        }
    }

    /// Encrypted replacements for this row's plaintext fields.
    /// Empty, null and already-encrypted fields are left alone.
    fn seal_row(&self, codec: &Codec, owner: &str, row: &Row) -> Result<Row, chatcrypt::Error> {
        let mut updates = Row::new();
        for field in &self.fields {
            let Some(value) = row.get(field).and_then(Value::as_str) else {
                continue;
            };
            if value.is_empty() || is_envelope(value) {
                continue;
            }
            let sealed = codec.encrypt_profile_field(value, owner)?;
            updates.insert(field.clone(), Value::from(sealed));
        }
        Ok(updates)
    }

    pub async fn run<S: Store + ?Sized>(
        &self,
        store: &S,
        codec: &Codec,
        cancel: &CancellationToken,
    ) -> Result<FieldMigrationReport, MigrationError> {
        let rows = store
            .fetch_all(&self.table, Some(&self.order_column))
            .await
            .map_err(MigrationError::Fetch)?;

        let mut report = FieldMigrationReport {
            table: self.table.clone(),
            total_rows: rows.len(),
            ..FieldMigrationReport::default()
        };

        for row in &rows {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let id = RowId::of(row);
            let owner = row.get(&self.owner_column).and_then(RowId::from_value);
            let (Some(id), Some(owner)) = (id, owner) else {
                report.failures.push(RowFailure {
                    id: RowId::of(row).map_or_else(|| "<unknown>".to_owned(), |id| id.to_string()),
                    reason: format!("missing id or {}", self.owner_column),
                });
                continue;
            };

            let updates = match self.seal_row(codec, owner.as_str(), row) {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!(table = %self.table, %id, error = %e, "row left unmigrated");
                    report.failures.push(RowFailure {
                        id: id.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if updates.is_empty() {
                report.skipped_count += 1;
                continue;
            }
            match store.update_by_id(&self.table, &id, updates).await {
                Ok(()) => report.migrated_count += 1,
                Err(e) => {
                    tracing::warn!(table = %self.table, %id, error = %e, "row left unmigrated");
                    report.failures.push(RowFailure {
                        id: id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            table = %self.table,
            migrated = report.migrated_count,
            skipped = report.skipped_count,
            failed = report.failures.len(),
            total = report.total_rows,
            "field migration finished"
        );
        Ok(report)
    }
}
