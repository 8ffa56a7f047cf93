use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {table}: {reason}")]
    Read { table: String, reason: String },
    #[error("failed to write {table} row {id}: {reason}")]
    Write {
        table: String,
        id: String,
        reason: String,
    },
    #[error("unexpected {table} row shape: {reason}")]
    Decode { table: String, reason: String },
    #[error("store client setup failed: {0}")]
    Client(String),
}

impl StoreError {
    pub(crate) fn read(table: &str, reason: impl ToString) -> Self {
        StoreError::Read {
            table: table.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(table: &str, id: impl ToString, reason: impl ToString) -> Self {
        StoreError::Write {
            table: table.to_owned(),
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
