//! In-place encryption of the chat message table.
//!
//! The run is a small state machine: fetch every row oldest first, then visit
//! rows one at a time, skipping envelopes and writing the rest back encrypted.
//! It ends in `Completed` with a report or `Failed` when the fetch itself
//! fails. Row-level failures are recorded and the row stays plaintext for the
//! next run. Concurrent runs against one table are not coordinated.

use chatcrypt::{is_envelope, Codec};
use chatstore::{MessageRow, Query, Row, RowId, Store, MESSAGES_TABLE};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::MigrationError;
use crate::report::{MigrationReport, MigrationStatus, RowFailure};

pub const DEFAULT_STATUS_SAMPLE: usize = 100;

enum State {
    Fetch,
    Visit {
        rows: std::vec::IntoIter<Row>,
        report: MigrationReport,
    },
    Completed(MigrationReport),
    Failed(MigrationError),
}

enum RowOutcome {
    Skipped,
    Migrated,
    Failed(RowFailure),
}

#[derive(Debug, Clone)]
pub struct MessageMigration {
    table: String,
}

impl Default for MessageMigration {
    fn default() -> Self {
        Self::new(MESSAGES_TABLE)
    }
}

impl MessageMigration {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Encrypt every plaintext message in the table.
    ///
    /// `cancel` is checked between rows; a cancelled run still returns the
    /// counts gathered so far.
    pub async fn run<S: Store + ?Sized>(
        &self,
        store: &S,
        codec: &Codec,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, MigrationError> {
        let mut state = State::Fetch;
        loop {
            state = match state {
                State::Fetch => {
                    tracing::debug!(table = %self.table, "fetching rows");
                    match store.fetch_all(&self.table, Some("created_at")).await {
                        Ok(rows) => State::Visit {
                            report: MigrationReport {
                                total_messages: rows.len(),
                                ..MigrationReport::default()
                            },
                            rows: rows.into_iter(),
                        },
                        Err(e) => State::Failed(MigrationError::Fetch(e)),
                    }
                }
                State::Visit {
                    mut rows,
                    mut report,
                } => {
                    if cancel.is_cancelled() {
                        tracing::warn!(table = %self.table, "migration cancelled");
                        report.cancelled = true;
                        State::Completed(report)
                    } else if let Some(row) = rows.next() {
                        match self.visit(store, codec, &row).await {
                            RowOutcome::Skipped => report.skipped_count += 1,
                            RowOutcome::Migrated => report.migrated_count += 1,
                            RowOutcome::Failed(f) => report.failures.push(f),
                        }
                        State::Visit { rows, report }
                    } else {
                        State::Completed(report)
                    }
                }
                State::Completed(report) => {
                    tracing::info!(
                        table = %self.table,
                        migrated = report.migrated_count,
                        skipped = report.skipped_count,
                        failed = report.failures.len(),
                        total = report.total_messages,
                        cancelled = report.cancelled,
                        "message migration finished"
                    );
                    return Ok(report);
                }
                State::Failed(e) => {
                    tracing::error!(table = %self.table, error = %e, "message migration failed");
                    return Err(e);
                }
            };
        }
    }

    async fn visit<S: Store + ?Sized>(&self, store: &S, codec: &Codec, row: &Row) -> RowOutcome {
        let fail = |id: String, reason: String| {
            tracing::warn!(table = %self.table, %id, %reason, "row left unmigrated");
            RowOutcome::Failed(RowFailure { id, reason })
        };

        let msg = match MessageRow::from_row(row) {
            Ok(m) => m,
            Err(e) => {
                let id = RowId::of(row).map_or_else(|| "<unknown>".to_owned(), |id| id.to_string());
                return fail(id, e.to_string());
            }
        };
        if is_envelope(&msg.message) {
            return RowOutcome::Skipped;
        }

        let envelope = match codec.encrypt_for_conversation(&msg.message, &msg.sender_id, &msg.receiver_id) {
            Ok(env) => env,
            Err(e) => return fail(msg.id.to_string(), e.to_string()),
        };
        let mut fields = Row::new();
        fields.insert("message".into(), Value::from(envelope));
        match store.update_by_id(&self.table, &msg.id, fields).await {
            Ok(()) => RowOutcome::Migrated,
            Err(e) => fail(msg.id.to_string(), e.to_string()),
        }
    }

    /// Sample up to `sample` rows and report how many are still plaintext.
    /// Never writes.
    pub async fn status<S: Store + ?Sized>(
        &self,
        store: &S,
        sample: usize,
    ) -> Result<MigrationStatus, MigrationError> {
        let query = Query::new().order_asc("created_at").limit(sample);
        let rows = store
            .fetch(&self.table, &query)
            .await
            .map_err(MigrationError::Fetch)?;

        let mut status = MigrationStatus {
            total_sampled: rows.len(),
            ..MigrationStatus::default()
        };
        for row in &rows {
            match row.get("message").and_then(Value::as_str) {
                Some(m) if is_envelope(m) => status.encrypted_count += 1,
                Some(_) => status.unencrypted_count += 1,
                None => status.malformed_count += 1,
            }
        }
        status.needs_migration = status.unencrypted_count > 0;
        tracing::debug!(table = %self.table, ?status, "sampled migration status");
        Ok(status)
    }
}
