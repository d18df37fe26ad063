use kvs_crypto::CryptoError;
use kvs_dao::KvError;
use kvs_types::ErrorKind;
use uuid::Uuid;

/// Errors from a fast store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FastStoreError {
    #[error("invalid fast store configuration: {0}")]
    Config(String),

    #[error("fast store unreachable: {0}")]
    Unavailable(String),

    #[error("fast store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for FastStoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_refusal() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// Errors from lock operations. The same kinds come back whichever backend
/// served the call.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock {key} is already held")]
    AlreadyHeld { key: Uuid },

    #[error("lock {key} could not be acquired")]
    AcquireFailed {
        key: Uuid,
        #[source]
        source: KvError,
    },

    #[error("lock {key} could not be released")]
    ReleaseFailed {
        key: Uuid,
        #[source]
        source: KvError,
    },

    #[error("lock backend error")]
    Backend(#[from] FastStoreError),

    #[error("cannot derive lock key")]
    Derivation(#[from] CryptoError),
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyHeld { .. } => ErrorKind::LockAlreadyHeld,
            Self::AcquireFailed { .. } | Self::Derivation(_) => ErrorKind::LockAcquireFailed,
            Self::ReleaseFailed { .. } => ErrorKind::LockReleaseFailed,
            Self::Backend(_) => ErrorKind::LockBackendError,
        }
    }
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
