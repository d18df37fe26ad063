use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use kvs_crypto::{HandleCodec, HashAlgorithm, DEFAULT_ALPHABET, DEFAULT_MIN_LENGTH};
use kvs_dao::HashPolicy;
use kvs_lock::{LockSettings, MAX_LOCK_TTL};
use kvs_permalink::PermalinkSettings;
use kvs_store::SqliteConfig;
use kvs_types::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a store deployment, usually loaded from TOML.
///
/// Every field has a default, so an empty file is a valid in-memory
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KvsConfig {
    /// Algorithm for every namespace UUID written from now on.
    pub hash_algo: HashAlgorithm,
    /// Legacy algorithms tried in order when a read under `hash_algo` misses.
    pub hash_algo_fallbacks: Vec<HashAlgorithm>,
    /// `redis://` URL. When set, locks prefer Redis while it is reachable.
    pub fast_store_url: Option<String>,
    pub fast_store_timeout_ms: u64,
    pub default_lock_ttl_seconds: u64,
    /// Seed of the metastore cache namespace.
    pub cache_key_prefix: String,
    /// `0` means cache entries never expire by default.
    pub cache_default_ttl_seconds: u64,
    pub permalink_key_alphabet: String,
    pub permalink_key_min_length: usize,
    /// Prefix of the `url` returned for a new permalink.
    pub permalink_url_base: String,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

impl Default for KvsConfig {
    fn default() -> Self {
        Self {
            hash_algo: HashAlgorithm::Sha256,
            hash_algo_fallbacks: vec![HashAlgorithm::Md5],
            fast_store_url: None,
            fast_store_timeout_ms: 500,
            default_lock_ttl_seconds: 30,
            cache_key_prefix: "kvs_metastore_cache".into(),
            cache_default_ttl_seconds: 300,
            permalink_key_alphabet: DEFAULT_ALPHABET.into(),
            permalink_key_min_length: DEFAULT_MIN_LENGTH,
            permalink_url_base: String::new(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl KvsConfig {
    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_algo_fallbacks.contains(&self.hash_algo) {
            return Err(ConfigError::Invalid(format!(
                "hash_algo_fallbacks must not contain hash_algo ({})",
                self.hash_algo
            )));
        }
        for (i, algo) in self.hash_algo_fallbacks.iter().enumerate() {
            if self.hash_algo_fallbacks[..i].contains(algo) {
                return Err(ConfigError::Invalid(format!(
                    "hash_algo_fallbacks lists {algo} twice"
                )));
            }
        }

        let max = MAX_LOCK_TTL.as_secs();
        if !(1..=max).contains(&self.default_lock_ttl_seconds) {
            return Err(ConfigError::Invalid(format!(
                "default_lock_ttl_seconds must be within 1..={max}, got {}",
                self.default_lock_ttl_seconds
            )));
        }

        if self.fast_store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fast_store_timeout_ms must be positive".into()));
        }
        if let Some(url) = &self.fast_store_url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(ConfigError::Invalid(format!(
                    "fast_store_url must be a redis:// URL, got {url:?}"
                )));
            }
        }

        HandleCodec::new("", &self.permalink_key_alphabet, self.permalink_key_min_length)
            .map_err(|e| ConfigError::Invalid(format!("permalink_key_alphabet: {e}")))?;

        if self.cache_key_prefix.is_empty() {
            return Err(ConfigError::Invalid("cache_key_prefix must not be empty".into()));
        }

        if let Some(reserved) = self
            .server
            .kv_resources
            .iter()
            .find(|r| !is_exposable(**r))
        {
            return Err(ConfigError::Invalid(format!(
                "resource {reserved} is managed internally and cannot be exposed over REST"
            )));
        }
        if self.server.user_header.trim().is_empty() {
            return Err(ConfigError::Invalid("server.user_header must not be empty".into()));
        }
        Ok(())
    }

    pub fn hash_policy(&self) -> HashPolicy {
        HashPolicy {
            primary: self.hash_algo,
            fallbacks: self.hash_algo_fallbacks.clone(),
        }
    }

    pub fn permalink_settings(&self) -> PermalinkSettings {
        PermalinkSettings {
            alphabet: self.permalink_key_alphabet.clone(),
            min_length: self.permalink_key_min_length,
            hashing: self.hash_policy(),
        }
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            hash_algo: self.hash_algo,
            default_ttl: Duration::from_secs(self.default_lock_ttl_seconds),
        }
    }

    pub fn cache_default_ttl(&self) -> Option<Duration> {
        match self.cache_default_ttl_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn fast_store_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_store_timeout_ms)
    }
}

/// Salts, locks, permalinks and cache entries have their own surfaces.
fn is_exposable(resource: Resource) -> bool {
    matches!(resource, Resource::Kv)
}

/// Where entries are persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// Process-local; lost on exit.
    #[default]
    Memory,
    Sqlite(SqliteConfig),
}

/// The `[server]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Resources served under `/api/v1/kv/{resource}`.
    pub kv_resources: Vec<Resource>,
    /// Header carrying the authenticated user id, set by a trusted proxy.
    pub user_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            kv_resources: vec![Resource::Kv],
            user_header: "x-kvs-user-id".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = KvsConfig::default();
        c.validate().unwrap();
        assert_eq!(c.hash_algo, HashAlgorithm::Sha256);
        assert_eq!(c.hash_algo_fallbacks, vec![HashAlgorithm::Md5]);
        assert_eq!(c.default_lock_ttl_seconds, 30);
        assert_eq!(c.permalink_key_min_length, 11);
        assert_eq!(c.database, DatabaseConfig::Memory);
        assert_eq!(c.server.bind_addr, "127.0.0.1:8088".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(KvsConfig::from_toml("").unwrap(), KvsConfig::default());
    }

    #[test]
    fn parses_full_file() {
        let c = KvsConfig::from_toml(
            r#"
            hash_algo = "blake3"
            hash_algo_fallbacks = ["sha256", "md5"]
            fast_store_url = "redis://cache:6379/0"
            default_lock_ttl_seconds = 120
            cache_key_prefix = "meta"
            cache_default_ttl_seconds = 0
            permalink_url_base = "https://bi.example.com"

            [database]
            backend = "sqlite"
            path = "/var/lib/kvs/kvs.db"

            [server]
            bind_addr = "0.0.0.0:9000"
            kv_resources = ["kv"]
            "#,
        )
        .unwrap();
        assert_eq!(c.hash_algo, HashAlgorithm::Blake3);
        assert_eq!(c.fast_store_url.as_deref(), Some("redis://cache:6379/0"));
        assert_eq!(c.lock_settings().default_ttl, Duration::from_secs(120));
        assert_eq!(c.cache_default_ttl(), None);
        assert_eq!(
            c.database,
            DatabaseConfig::Sqlite(SqliteConfig::new("/var/lib/kvs/kvs.db"))
        );
        assert_eq!(c.server.bind_addr.port(), 9000);
        assert_eq!(c.hash_policy().fallbacks.len(), 2);
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = KvsConfig::default();
        c.database = DatabaseConfig::Sqlite(SqliteConfig::new("kvs.db"));
        c.fast_store_url = Some("redis://localhost/".into());
        let text = c.to_toml().unwrap();
        assert_eq!(KvsConfig::from_toml(&text).unwrap(), c);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            KvsConfig::from_toml("hash_algorithm = \"md5\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_primary_in_fallbacks() {
        let err = KvsConfig::from_toml("hash_algo = \"md5\"").unwrap_err();
        assert!(err.to_string().contains("hash_algo_fallbacks"));
    }

    #[test]
    fn rejects_out_of_range_lock_ttl() {
        for ttl in [0, 3601] {
            let c = KvsConfig {
                default_lock_ttl_seconds: ttl,
                ..Default::default()
            };
            assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn rejects_bad_alphabet() {
        let c = KvsConfig {
            permalink_key_alphabet: "abc".into(),
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_redis_url() {
        let c = KvsConfig {
            fast_store_url: Some("http://cache:6379".into()),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_exposing_internal_resources() {
        let mut c = KvsConfig::default();
        c.server.kv_resources = vec![Resource::Kv, Resource::App];
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("app"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = KvsConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
