use std::sync::Arc;

use kvs_cache::MetastoreCache;
use kvs_crypto::fingerprint;
use kvs_dao::{get_permalink_salt, KeyValueDao};
use kvs_lock::{DistributedLock, FastStore, RedisFastStore};
use kvs_permalink::{AllowAll, ObjectResolver, PermalinkKind, PermalinkService};
use kvs_store::{InMemoryKvStore, KvBackend, SqliteKvStore};
use kvs_types::{Clock, Resource, SystemClock};
use tracing::info;

use crate::config::{DatabaseConfig, KvsConfig};
use crate::error::{ConfigError, SdkResult};

/// One handle over every service of a deployment.
///
/// All services share one DAO, so they see the same backend and clock.
/// Cloning a service out of `Kvs` is cheap; the handle itself is usually
/// kept in an `Arc`.
pub struct Kvs {
    config: KvsConfig,
    dao: KeyValueDao,
    dashboard: PermalinkService,
    explore: PermalinkService,
    sqllab: PermalinkService,
    cache: MetastoreCache,
    lock: DistributedLock,
    fast: Option<Arc<dyn FastStore>>,
}

impl Kvs {
    /// Validate `config` and open the configured backend. Every permalink
    /// target is treated as accessible.
    pub fn open(config: KvsConfig) -> SdkResult<Self> {
        config.validate()?;
        let backend: Arc<dyn KvBackend> = match &config.database {
            DatabaseConfig::Memory => Arc::new(InMemoryKvStore::new()),
            DatabaseConfig::Sqlite(sqlite) => Arc::new(SqliteKvStore::open(sqlite)?),
        };
        Self::assemble(config, backend, Arc::new(SystemClock), Arc::new(AllowAll))
    }

    /// A fresh in-memory deployment with default settings.
    pub fn in_memory() -> SdkResult<Self> {
        Self::open(KvsConfig::default())
    }

    /// Build every service over an existing backend. The `database` section
    /// of `config` is ignored.
    pub fn assemble(
        config: KvsConfig,
        backend: Arc<dyn KvBackend>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn ObjectResolver>,
    ) -> SdkResult<Self> {
        config.validate()?;
        let fast = match &config.fast_store_url {
            Some(url) => {
                let store = RedisFastStore::new(url, config.fast_store_timeout())?;
                Some(Arc::new(store) as Arc<dyn FastStore>)
            }
            None => None,
        };
        Self::assemble_with_fast_store(config, backend, clock, resolver, fast)
    }

    /// Like [`Kvs::assemble`], with an explicit fast store in place of
    /// `fast_store_url`.
    pub fn assemble_with_fast_store(
        config: KvsConfig,
        backend: Arc<dyn KvBackend>,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn ObjectResolver>,
        fast: Option<Arc<dyn FastStore>>,
    ) -> SdkResult<Self> {
        config.validate()?;
        let dao = KeyValueDao::with_clock(backend, clock);
        let settings = config.permalink_settings();
        let permalink = |kind| {
            PermalinkService::new(kind, dao.clone(), resolver.clone(), settings.clone())
        };
        let dashboard = permalink(PermalinkKind::Dashboard)?;
        let explore = permalink(PermalinkKind::Explore)?;
        let sqllab = permalink(PermalinkKind::Sqllab)?;
        let cache = MetastoreCache::new(
            dao.clone(),
            &config.cache_key_prefix,
            config.hash_algo,
            config.cache_default_ttl(),
        );
        let lock = DistributedLock::new(dao.clone(), fast.clone(), config.lock_settings());

        info!(
            backend = dao.backend().name(),
            fast_store = fast.as_ref().map(|f| f.name()).unwrap_or("none"),
            hash_algo = %config.hash_algo,
            "kvs services ready"
        );
        Ok(Self {
            config,
            dao,
            dashboard,
            explore,
            sqllab,
            cache,
            lock,
            fast,
        })
    }

    pub fn config(&self) -> &KvsConfig {
        &self.config
    }

    pub fn dao(&self) -> &KeyValueDao {
        &self.dao
    }

    pub fn permalinks(&self, kind: PermalinkKind) -> &PermalinkService {
        match kind {
            PermalinkKind::Dashboard => &self.dashboard,
            PermalinkKind::Explore => &self.explore,
            PermalinkKind::Sqllab => &self.sqllab,
        }
    }

    pub fn cache(&self) -> &MetastoreCache {
        &self.cache
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// Permanently remove expired entries of `resource`.
    pub fn sweep(&self, resource: Resource) -> SdkResult<usize> {
        let removed = self.dao.delete_expired_entries(resource)?;
        info!(%resource, removed, "swept expired entries");
        Ok(removed)
    }

    /// Bootstrap the salt of a permalink resource if needed and return its
    /// fingerprint. The salt itself never leaves this call.
    pub fn salt_fingerprint(&self, resource: Resource) -> SdkResult<String> {
        if !resource.is_permalink() {
            return Err(ConfigError::Invalid(format!("{resource} has no permalink salt")).into());
        }
        let salt = get_permalink_salt(&self.dao, resource, &self.config.hash_policy())?;
        Ok(fingerprint(&salt))
    }

    /// Drop pooled fast store connections. Services keep working and
    /// reconnect on next use.
    pub fn shutdown(&self) {
        if let Some(fast) = &self.fast {
            fast.shutdown();
        }
    }
}

impl std::fmt::Debug for Kvs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kvs")
            .field("backend", &self.dao.backend().name())
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_cache::Ttl;
    use kvs_types::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn in_memory_services_work_together() {
        let kvs = Kvs::in_memory().unwrap();

        let state = json!({"dashboardId": "42", "state": {"hash": "x"}});
        let handle = kvs.permalinks(PermalinkKind::Dashboard).create(&state).unwrap();
        assert_eq!(
            kvs.permalinks(PermalinkKind::Dashboard).get(&handle).unwrap(),
            Some(state)
        );

        kvs.cache().set("k", "v", Ttl::Default).unwrap();
        assert_eq!(kvs.cache().get::<String>("k").unwrap().as_deref(), Some("v"));

        let out = kvs.lock().with_lock("job", &json!({}), None, |_| 5).unwrap();
        assert_eq!(out, 5);
    }

    #[test]
    fn permalink_kinds_are_routed() {
        let kvs = Kvs::in_memory().unwrap();
        for kind in PermalinkKind::ALL {
            assert_eq!(kvs.permalinks(kind).kind(), kind);
        }
    }

    #[test]
    fn sweep_removes_expired_cache_entries() {
        let clock = Arc::new(ManualClock::starting_now());
        let kvs = Kvs::assemble(
            KvsConfig::default(),
            Arc::new(InMemoryKvStore::new()),
            clock.clone(),
            Arc::new(AllowAll),
        )
        .unwrap();
        kvs.cache()
            .set("k", "v", Ttl::After(Duration::from_secs(10)))
            .unwrap();
        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(kvs.sweep(Resource::MetastoreCache).unwrap(), 1);
        assert_eq!(kvs.sweep(Resource::MetastoreCache).unwrap(), 0);
    }

    #[test]
    fn salt_fingerprint_is_stable() {
        let kvs = Kvs::in_memory().unwrap();
        let first = kvs.salt_fingerprint(Resource::ExplorePermalink).unwrap();
        assert_eq!(first.len(), 16);
        assert_eq!(kvs.salt_fingerprint(Resource::ExplorePermalink).unwrap(), first);
        assert_ne!(kvs.salt_fingerprint(Resource::DashboardPermalink).unwrap(), first);
    }

    #[test]
    fn salt_fingerprint_requires_permalink_resource() {
        let kvs = Kvs::in_memory().unwrap();
        assert!(kvs.salt_fingerprint(Resource::Lock).is_err());
    }

    #[test]
    fn open_rejects_invalid_config() {
        let config = KvsConfig {
            default_lock_ttl_seconds: 0,
            ..Default::default()
        };
        assert!(Kvs::open(config).is_err());
    }

    #[test]
    fn redis_url_configures_fast_store_lazily() {
        let config = KvsConfig {
            fast_store_url: Some("redis://127.0.0.1:1/".into()),
            fast_store_timeout_ms: 100,
            ..Default::default()
        };
        let kvs = Kvs::open(config).unwrap();
        // Unreachable Redis: the lock falls back to the key-value store.
        let _guard = kvs.lock().acquire("job", &json!({"n": 1}), None).unwrap();
        kvs.shutdown();
    }
}
