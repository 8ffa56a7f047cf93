//! One-shot conversion of stored plaintext to encrypted envelopes.
//! - [`MessageMigration`]: chat messages under conversation keys.
//! - [`FieldMigration`]: per-user columns (journal entries, profile fields).
//!
//! Both are idempotent: envelopes are skipped, so a rerun after a partial
//! failure only touches the rows that are still plaintext.

pub mod error;
pub mod fields;
pub mod messages;
pub mod report;

pub use error::MigrationError;
pub use fields::FieldMigration;
pub use messages::{MessageMigration, DEFAULT_STATUS_SAMPLE};
pub use report::{FieldMigrationReport, MigrationReport, MigrationStatus, RowFailure};
