//! Metastore cache adapter.
//!
//! [`MetastoreCache`] offers the usual cache contract (`get`, `set`, `add`,
//! `has`, `delete`, default TTL) on top of the key-value DAO, so cached
//! metadata is shared by every worker that shares the database.

pub mod cache;
pub mod error;

pub use cache::{MetastoreCache, Ttl};
pub use error::{CacheError, CacheResult};
