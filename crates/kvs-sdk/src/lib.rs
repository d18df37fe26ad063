//! High-level SDK for the key-value resource store.
//!
//! [`KvsConfig`] describes a deployment (TOML, every key defaulted) and
//! [`Kvs`] builds every service from it: the DAO, the three permalink
//! services, the metastore cache and the distributed lock. This is the
//! main entry point for applications embedding the store.

pub mod config;
pub mod error;
pub mod kvs;

pub use config::{DatabaseConfig, KvsConfig, ServerConfig};
pub use error::{ConfigError, SdkError, SdkResult};
pub use kvs::Kvs;

// Re-export key types
pub use kvs_cache::{MetastoreCache, Ttl};
pub use kvs_dao::{KeyValueDao, KvError};
pub use kvs_lock::{DistributedLock, LockError, LockGuard};
pub use kvs_permalink::{ObjectResolver, PermalinkError, PermalinkKind, PermalinkService};
pub use kvs_types::{ErrorKind, Key, Resource, UserId};
