/// Errors from identity and handle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("unknown hash algorithm: {0:?}")]
    UnknownAlgorithm(String),

    #[error("cannot canonicalize derivation parameters: {0}")]
    Canonicalize(String),

    #[error("invalid handle alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("malformed handle: {0:?}")]
    MalformedHandle(String),

    #[error("id {0} cannot be encoded as a handle")]
    UnencodableId(i64),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
