use kvs_dao::KvError;
use kvs_types::ErrorKind;

/// Errors from the metastore cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache operation failed: {0}")]
    Kv(#[from] KvError),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kv(err) => err.kind(),
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
