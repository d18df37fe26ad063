use kvs_types::ErrorKind;

/// Errors from encoding or decoding a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented by the codec.
    #[error("{codec} encode failed: {reason}")]
    Encode { codec: &'static str, reason: String },

    /// The bytes are not a valid payload for the codec.
    #[error("{codec} decode failed: {reason}")]
    Decode { codec: &'static str, reason: String },

    /// The schema itself does not compile.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encode { .. } | Self::InvalidSchema(_) => ErrorKind::CodecEncode,
            Self::Decode { .. } => ErrorKind::CodecDecode,
        }
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
