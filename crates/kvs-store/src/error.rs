use kvs_types::{Key, Resource};

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint on `(resource, id)` or `(resource, uuid)` was violated.
    #[error("duplicate key {key} in resource {resource}")]
    Duplicate { resource: Resource, key: Key },

    /// The underlying database reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be mapped back into an entry.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
