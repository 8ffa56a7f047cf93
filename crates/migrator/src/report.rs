use serde::Serialize;

/// A row left untouched by a migration run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub total_messages: usize,
    pub failures: Vec<RowFailure>,
    /// The run stopped early on request; counts cover the rows visited.
    pub cancelled: bool,
}

/// Read-only sample of how much of a table still needs encrypting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub needs_migration: bool,
    pub unencrypted_count: usize,
    pub encrypted_count: usize,
    /// Rows whose message is missing or not text; `run` reports these as
    /// failures.
    pub malformed_count: usize,
    pub total_sampled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMigrationReport {
    pub table: String,
    pub migrated_count: usize,
    pub skipped_count: usize,
    pub total_rows: usize,
    pub failures: Vec<RowFailure>,
    pub cancelled: bool,
}
