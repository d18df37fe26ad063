use kvs_codec::CodecError;
use kvs_crypto::CryptoError;
use kvs_store::StoreError;
use kvs_types::{ErrorKind, Key, Resource};

/// Errors from DAO operations.
///
/// Store failures are classified by the operation that hit them; the
/// underlying [`StoreError`] stays reachable through `source()`.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("no entry {key} in {resource}")]
    NotFound { resource: Resource, key: Key },

    #[error("key {key} already exists in {resource}")]
    DuplicateKey { resource: Resource, key: Key },

    #[error("cannot encode value")]
    CodecEncode(#[source] CodecError),

    #[error("cannot decode value")]
    CodecDecode(#[source] CodecError),

    #[error("cannot derive entry key")]
    Derivation(#[source] CryptoError),

    #[error("read failed")]
    ReadFailed(#[source] StoreError),

    #[error("create failed")]
    CreateFailed(#[source] StoreError),

    #[error("update failed")]
    UpdateFailed(#[source] StoreError),

    #[error("delete failed")]
    DeleteFailed(#[source] StoreError),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Self::CodecEncode(_) | Self::Derivation(_) => ErrorKind::CodecEncode,
            Self::CodecDecode(_) => ErrorKind::CodecDecode,
            Self::ReadFailed(_) => ErrorKind::ReadFailed,
            Self::CreateFailed(_) => ErrorKind::CreateFailed,
            Self::UpdateFailed(_) => ErrorKind::UpdateFailed,
            Self::DeleteFailed(_) => ErrorKind::DeleteFailed,
        }
    }

    /// Classify a store failure from an insert. Unique-constraint violations
    /// become [`KvError::DuplicateKey`].
    pub(crate) fn from_insert(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { resource, key } => Self::DuplicateKey { resource, key },
            other => Self::CreateFailed(other),
        }
    }
}

/// Result alias for DAO operations.
pub type KvResult<T> = Result<T, KvError>;
