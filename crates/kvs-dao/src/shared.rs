use kvs_codec::Codec;
use kvs_crypto::{derive, generate_salt, namespace, HashAlgorithm};
use kvs_types::{Key, Resource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dao::KeyValueDao;
use crate::error::{KvError, KvResult};

/// Which hash algorithms derive namespace UUIDs.
///
/// Writes always use `primary`. `fallbacks` are tried in order on read, so
/// entries written before `primary` changed can still be found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPolicy {
    pub primary: HashAlgorithm,
    pub fallbacks: Vec<HashAlgorithm>,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            primary: HashAlgorithm::Sha256,
            fallbacks: vec![HashAlgorithm::Md5],
        }
    }
}

/// Key of the shared entry that holds `resource`'s salt, under `algo`.
pub fn salt_key(resource: Resource, algo: HashAlgorithm) -> KvResult<Uuid> {
    derive(namespace("", algo), resource.tag()).map_err(KvError::Derivation)
}

/// Return the salt for `resource`, creating it on first use.
///
/// Safe to call concurrently from any number of workers: exactly one salt
/// is ever persisted under the primary key, and every caller returns it.
/// A salt found only under a fallback algorithm is copied to the primary
/// key; the legacy entry is left where it is.
pub fn get_permalink_salt(
    dao: &KeyValueDao,
    resource: Resource,
    policy: &HashPolicy,
) -> KvResult<String> {
    let codec = Codec::JsonLiteral;
    let key = Key::Uuid(salt_key(resource, policy.primary)?);
    if let Some(salt) = dao.get_value::<String>(Resource::App, &key, &codec)? {
        return Ok(salt);
    }

    for &fallback in &policy.fallbacks {
        let legacy = Key::Uuid(salt_key(resource, fallback)?);
        let Some(salt) = dao.get_value::<String>(Resource::App, &legacy, &codec)? else {
            continue;
        };
        match dao.create_entry(Resource::App, &salt, &codec, Some(key), None) {
            Ok(_) => info!(%resource, from = %fallback, to = %policy.primary, "migrated salt"),
            Err(err) => debug!(%resource, error = %err, "salt migration skipped"),
        }
        return Ok(salt);
    }

    let salt = generate_salt();
    match dao.create_entry(Resource::App, &salt, &codec, Some(key), None) {
        Ok(_) => {
            info!(%resource, algo = %policy.primary, "bootstrapped salt");
            Ok(salt)
        }
        Err(KvError::DuplicateKey { .. }) => {
            warn!(%resource, "lost salt bootstrap race, reading peer's value");
            dao.get_value::<String>(Resource::App, &key, &codec)?
                .ok_or(KvError::NotFound {
                    resource: Resource::App,
                    key,
                })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_store::InMemoryKvStore;
    use std::sync::Arc;

    fn dao() -> KeyValueDao {
        KeyValueDao::new(Arc::new(InMemoryKvStore::new()))
    }

    #[test]
    fn first_call_generates_and_later_calls_reuse() {
        let dao = dao();
        let policy = HashPolicy::default();
        let first = get_permalink_salt(&dao, Resource::DashboardPermalink, &policy).unwrap();
        let second = get_permalink_salt(&dao, Resource::DashboardPermalink, &policy).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn salts_are_per_resource() {
        let dao = dao();
        let policy = HashPolicy::default();
        let dashboard = get_permalink_salt(&dao, Resource::DashboardPermalink, &policy).unwrap();
        let explore = get_permalink_salt(&dao, Resource::ExplorePermalink, &policy).unwrap();
        assert_ne!(dashboard, explore);
    }

    #[test]
    fn legacy_salt_is_migrated_and_kept() {
        let dao = dao();
        let legacy = Key::Uuid(salt_key(Resource::ExplorePermalink, HashAlgorithm::Md5).unwrap());
        dao.create_entry(Resource::App, "old-salt", &Codec::JsonLiteral, Some(legacy), None)
            .unwrap();

        let policy = HashPolicy::default();
        let salt = get_permalink_salt(&dao, Resource::ExplorePermalink, &policy).unwrap();
        assert_eq!(salt, "old-salt");

        let primary = Key::Uuid(salt_key(Resource::ExplorePermalink, HashAlgorithm::Sha256).unwrap());
        let migrated: Option<String> = dao
            .get_value(Resource::App, &primary, &Codec::JsonLiteral)
            .unwrap();
        assert_eq!(migrated.as_deref(), Some("old-salt"));
        assert!(dao.get_entry(Resource::App, &legacy).unwrap().is_some());
    }

    #[test]
    fn fallbacks_are_not_consulted_when_empty() {
        let dao = dao();
        let legacy = Key::Uuid(salt_key(Resource::SqllabPermalink, HashAlgorithm::Md5).unwrap());
        dao.create_entry(Resource::App, "old-salt", &Codec::JsonLiteral, Some(legacy), None)
            .unwrap();
        let policy = HashPolicy {
            primary: HashAlgorithm::Blake3,
            fallbacks: Vec::new(),
        };
        let salt = get_permalink_salt(&dao, Resource::SqllabPermalink, &policy).unwrap();
        assert_ne!(salt, "old-salt");
    }

    #[test]
    fn salt_keys_differ_by_algorithm() {
        assert_ne!(
            salt_key(Resource::App, HashAlgorithm::Md5).unwrap(),
            salt_key(Resource::App, HashAlgorithm::Sha256).unwrap()
        );
    }
}
