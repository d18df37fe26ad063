use std::path::PathBuf;

use kvs_types::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot open store: {0}")]
    Store(#[from] kvs_store::StoreError),

    #[error("cannot configure fast store: {0}")]
    FastStore(#[from] kvs_lock::FastStoreError),

    #[error(transparent)]
    Permalink(#[from] kvs_permalink::PermalinkError),

    #[error(transparent)]
    Kv(#[from] kvs_dao::KvError),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::FastStore(_) => ErrorKind::Config,
            Self::Store(_) => ErrorKind::ReadFailed,
            Self::Permalink(err) => err.kind(),
            Self::Kv(err) => err.kind(),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
