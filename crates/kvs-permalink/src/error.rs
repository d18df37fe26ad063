use kvs_crypto::CryptoError;
use kvs_dao::KvError;
use kvs_types::ErrorKind;

use crate::kind::PermalinkKind;

/// Why a permalink operation failed.
#[derive(Debug, thiserror::Error)]
pub enum PermalinkCause {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Handle(#[from] CryptoError),

    #[error("access denied to {kind} target {target:?}")]
    AccessDenied { kind: PermalinkKind, target: String },

    #[error("{kind} state has no {field}")]
    MissingTarget {
        kind: PermalinkKind,
        field: &'static str,
    },
}

impl PermalinkCause {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kv(err) => err.kind(),
            Self::Handle(_) => ErrorKind::InvalidKey,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::MissingTarget { .. } => ErrorKind::CodecEncode,
        }
    }
}

/// Errors from the permalink service. Every failure collapses into one of
/// two wrappers; the specific cause is kept as the source.
#[derive(Debug, thiserror::Error)]
pub enum PermalinkError {
    #[error("permalink create failed: {0}")]
    CreateFailed(#[source] PermalinkCause),

    #[error("permalink get failed: {0}")]
    GetFailed(#[source] PermalinkCause),

    #[error("invalid permalink configuration: {0}")]
    Config(String),
}

impl PermalinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CreateFailed(_) => ErrorKind::PermalinkCreateFailed,
            Self::GetFailed(_) => ErrorKind::PermalinkGetFailed,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn cause(&self) -> Option<&PermalinkCause> {
        match self {
            Self::CreateFailed(cause) | Self::GetFailed(cause) => Some(cause),
            Self::Config(_) => None,
        }
    }

    /// Status for the surface: decided by the cause, so a resolver refusal
    /// is a 403 and a missing entry a 404 while persistence faults stay 500.
    pub fn http_status(&self) -> u16 {
        match self.cause() {
            Some(cause) => cause.kind().http_status(),
            None => self.kind().http_status(),
        }
    }
}

/// Result alias for permalink operations.
pub type PermalinkResult<T> = Result<T, PermalinkError>;
