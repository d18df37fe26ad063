use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    #[error("unknown resource: {0:?}")]
    UnknownResource(String),
}

impl TypeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidKey
    }
}

/// Stable error taxonomy.
///
/// Every error type in the workspace maps onto exactly one kind, and the
/// mapping does not depend on which persistence or lock backend produced the
/// error. Surface code uses [`ErrorKind::http_status`] to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    CodecEncode,
    CodecDecode,
    InvalidKey,
    ReadFailed,
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
    PermalinkCreateFailed,
    PermalinkGetFailed,
    LockAlreadyHeld,
    LockAcquireFailed,
    LockReleaseFailed,
    LockBackendError,
    AccessDenied,
    Config,
}

impl ErrorKind {
    /// HTTP status code presented to callers for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::AccessDenied => 403,
            Self::CodecEncode | Self::CodecDecode | Self::DuplicateKey | Self::InvalidKey => 400,
            _ => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DuplicateKey => "duplicate_key",
            Self::CodecEncode => "codec_encode",
            Self::CodecDecode => "codec_decode",
            Self::InvalidKey => "invalid_key",
            Self::ReadFailed => "read_failed",
            Self::CreateFailed => "create_failed",
            Self::UpdateFailed => "update_failed",
            Self::DeleteFailed => "delete_failed",
            Self::PermalinkCreateFailed => "permalink_create_failed",
            Self::PermalinkGetFailed => "permalink_get_failed",
            Self::LockAlreadyHeld => "lock_already_held",
            Self::LockAcquireFailed => "lock_acquire_failed",
            Self::LockReleaseFailed => "lock_release_failed",
            Self::LockBackendError => "lock_backend_error",
            Self::AccessDenied => "access_denied",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
