use std::time::Duration;

use chrono::{DateTime, Utc};
use kvs_codec::Codec;
use kvs_crypto::{derive_name, namespace, HashAlgorithm};
use kvs_dao::{KeyValueDao, KvError};
use kvs_types::{Key, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::CacheResult;

/// Lifetime of a cache write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ttl {
    /// The cache's configured default.
    #[default]
    Default,
    /// Never expires.
    Never,
    After(Duration),
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Self::After(ttl)
    }
}

/// A string-keyed TTL cache stored in the `metastore_cache` resource.
///
/// Keys are hashed into a per-instance namespace derived from a prefix, so
/// two caches with different prefixes never see each other's entries.
/// Values use [`Codec::OpaqueBinary`] unless another codec is chosen. The
/// binary codec cannot decode dynamically typed values such as
/// `serde_json::Value`; use [`Codec::JsonLiteral`] for those.
#[derive(Clone, Debug)]
pub struct MetastoreCache {
    dao: KeyValueDao,
    namespace: Uuid,
    default_ttl: Option<Duration>,
    codec: Codec,
}

impl MetastoreCache {
    /// `default_ttl` of `None` means entries written with [`Ttl::Default`]
    /// never expire.
    pub fn new(
        dao: KeyValueDao,
        prefix: &str,
        algo: HashAlgorithm,
        default_ttl: Option<Duration>,
    ) -> Self {
        Self {
            dao,
            namespace: namespace(prefix, algo),
            default_ttl,
            codec: Codec::OpaqueBinary,
        }
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// The entry uuid `key` is stored under.
    pub fn entry_key(&self, key: &str) -> Uuid {
        derive_name(self.namespace, key)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        Ok(self
            .dao
            .get_value(Resource::MetastoreCache, &self.key(key), &self.codec)?)
    }

    /// Write `value`, replacing whatever is cached under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Ttl) -> CacheResult<()> {
        self.dao.upsert_entry(
            Resource::MetastoreCache,
            value,
            &self.codec,
            &self.key(key),
            self.expires_on(ttl),
        )?;
        Ok(())
    }

    /// Write `value` only if nothing live is cached under `key`. Returns
    /// `false` when the key is taken.
    pub fn add<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Ttl) -> CacheResult<bool> {
        let created = self.dao.create_entry(
            Resource::MetastoreCache,
            value,
            &self.codec,
            Some(self.key(key)),
            self.expires_on(ttl),
        );
        match created {
            Ok(_) => {}
            Err(KvError::DuplicateKey { .. }) => return Ok(false),
            Err(err) => return Err(err.into()),
        }
        if let Err(err) = self.dao.delete_expired_entries(Resource::MetastoreCache) {
            warn!(error = %err, "metastore cache sweep failed");
        }
        Ok(true)
    }

    pub fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .dao
            .get_entry(Resource::MetastoreCache, &self.key(key))?
            .is_some())
    }

    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .dao
            .delete_entry(Resource::MetastoreCache, &self.key(key))?)
    }

    fn key(&self, key: &str) -> Key {
        Key::Uuid(self.entry_key(key))
    }

    fn expires_on(&self, ttl: Ttl) -> Option<DateTime<Utc>> {
        let ttl = match ttl {
            Ttl::Default => self.default_ttl?,
            Ttl::Never => return None,
            Ttl::After(ttl) => ttl,
        };
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        self.dao.now().checked_add_signed(ttl)
    }
}
