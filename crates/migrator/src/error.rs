use chatstore::StoreError;
use thiserror::Error;

/// Batch-level failure. Per-row problems never surface here; they are
/// collected in the report instead.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not load rows for migration: {0}")]
    Fetch(#[source] StoreError),
}
