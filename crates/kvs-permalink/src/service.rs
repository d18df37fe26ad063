use std::sync::{Arc, OnceLock};

use kvs_codec::Codec;
use kvs_crypto::{derive, namespace, HandleCodec, DEFAULT_ALPHABET, DEFAULT_MIN_LENGTH};
use kvs_dao::{get_permalink_salt, HashPolicy, KeyValueDao, KvError};
use kvs_types::{Key, UserId};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PermalinkCause, PermalinkError, PermalinkResult};
use crate::kind::PermalinkKind;

/// Decides whether the object a permalink points at still exists and is
/// visible to `user`. `None` is the anonymous caller.
pub trait ObjectResolver: Send + Sync {
    fn is_accessible(&self, user: Option<UserId>, target: &str) -> bool;
}

impl<F> ObjectResolver for F
where
    F: Fn(Option<UserId>, &str) -> bool + Send + Sync,
{
    fn is_accessible(&self, user: Option<UserId>, target: &str) -> bool {
        self(user, target)
    }
}

/// Resolver that accepts every target.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl ObjectResolver for AllowAll {
    fn is_accessible(&self, _user: Option<UserId>, _target: &str) -> bool {
        true
    }
}

/// Handle encoding and key derivation parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermalinkSettings {
    pub alphabet: String,
    pub min_length: usize,
    pub hashing: HashPolicy,
}

impl Default for PermalinkSettings {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_string(),
            min_length: DEFAULT_MIN_LENGTH,
            hashing: HashPolicy::default(),
        }
    }
}

/// Everything derived from the resource's salt.
struct Salted {
    handles: HandleCodec,
    namespace: Uuid,
}

/// Creates and resolves permalinks for one [`PermalinkKind`].
///
/// The salt is bootstrapped on first use and cached for the life of the
/// service; it never changes once written.
pub struct PermalinkService {
    kind: PermalinkKind,
    dao: KeyValueDao,
    codec: Codec,
    resolver: Arc<dyn ObjectResolver>,
    settings: PermalinkSettings,
    salted: OnceLock<Salted>,
}

impl PermalinkService {
    pub fn new(
        kind: PermalinkKind,
        dao: KeyValueDao,
        resolver: Arc<dyn ObjectResolver>,
        settings: PermalinkSettings,
    ) -> PermalinkResult<Self> {
        HandleCodec::new("", &settings.alphabet, settings.min_length)
            .map_err(|e| PermalinkError::Config(e.to_string()))?;
        let codec =
            Codec::schema(kind.schema()).map_err(|e| PermalinkError::Config(e.to_string()))?;
        Ok(Self {
            kind,
            dao,
            codec,
            resolver,
            settings,
            salted: OnceLock::new(),
        })
    }

    pub fn dashboard(
        dao: KeyValueDao,
        resolver: Arc<dyn ObjectResolver>,
        settings: PermalinkSettings,
    ) -> PermalinkResult<Self> {
        Self::new(PermalinkKind::Dashboard, dao, resolver, settings)
    }

    pub fn explore(
        dao: KeyValueDao,
        resolver: Arc<dyn ObjectResolver>,
        settings: PermalinkSettings,
    ) -> PermalinkResult<Self> {
        Self::new(PermalinkKind::Explore, dao, resolver, settings)
    }

    pub fn sqllab(
        dao: KeyValueDao,
        resolver: Arc<dyn ObjectResolver>,
        settings: PermalinkSettings,
    ) -> PermalinkResult<Self> {
        Self::new(PermalinkKind::Sqllab, dao, resolver, settings)
    }

    pub fn kind(&self) -> PermalinkKind {
        self.kind
    }

    /// Store `state` and return its handle, acting as the DAO's user.
    ///
    /// The entry key is derived from `(user, state)` under the salt, so the
    /// same user sharing the same state twice gets the same handle back.
    pub fn create(&self, state: &Value) -> PermalinkResult<String> {
        self.create_as(self.dao.actor(), state)
    }

    /// Store `state` on behalf of `user`.
    pub fn create_as(&self, user: Option<UserId>, state: &Value) -> PermalinkResult<String> {
        self.try_create(user, state)
            .map_err(PermalinkError::CreateFailed)
    }

    /// Resolve a handle back to its state, acting as the DAO's user.
    ///
    /// A handle that does not decode under this resource's salt, or that
    /// names no live entry, is `Ok(None)`.
    pub fn get(&self, handle: &str) -> PermalinkResult<Option<Value>> {
        self.get_as(self.dao.actor(), handle)
    }

    /// Resolve a handle on behalf of `user`. The resolver decides whether
    /// `user` may see the target.
    pub fn get_as(&self, user: Option<UserId>, handle: &str) -> PermalinkResult<Option<Value>> {
        self.try_get(user, handle).map_err(PermalinkError::GetFailed)
    }

    fn try_create(&self, user: Option<UserId>, state: &Value) -> Result<String, PermalinkCause> {
        self.authorize(user, state)?;
        let salted = self.salted()?;
        let uuid = derive(
            salted.namespace,
            &json!({"user_id": user.map(|u| u.0), "state": state}),
        )
        .map_err(KvError::Derivation)?;
        let entry = self.dao.as_user(user).upsert_entry(
            self.kind.resource(),
            state,
            &self.codec,
            &Key::Uuid(uuid),
            None,
        )?;
        let handle = salted.handles.encode(entry.id)?;
        debug!(kind = %self.kind, id = entry.id, "created permalink");
        Ok(handle)
    }

    fn try_get(&self, user: Option<UserId>, handle: &str) -> Result<Option<Value>, PermalinkCause> {
        let salted = self.salted()?;
        let id = match salted.handles.decode(handle) {
            Ok(id) => id,
            Err(err) => {
                debug!(kind = %self.kind, error = %err, "undecodable permalink handle");
                return Ok(None);
            }
        };
        let Some(state) =
            self.dao
                .get_value::<Value>(self.kind.resource(), &Key::Id(id), &self.codec)?
        else {
            return Ok(None);
        };
        self.authorize(user, &state)?;
        Ok(Some(state))
    }

    fn authorize(&self, user: Option<UserId>, state: &Value) -> Result<(), PermalinkCause> {
        let target = self.kind.target(state).ok_or(PermalinkCause::MissingTarget {
            kind: self.kind,
            field: self.kind.target_field(),
        })?;
        if self.resolver.is_accessible(user, &target) {
            Ok(())
        } else {
            Err(PermalinkCause::AccessDenied {
                kind: self.kind,
                target,
            })
        }
    }

    fn salted(&self) -> Result<&Salted, PermalinkCause> {
        if let Some(salted) = self.salted.get() {
            return Ok(salted);
        }
        let salt = get_permalink_salt(&self.dao, self.kind.resource(), &self.settings.hashing)?;
        let salted = Salted {
            handles: HandleCodec::new(&salt, &self.settings.alphabet, self.settings.min_length)?,
            namespace: namespace(&salt, self.settings.hashing.primary),
        };
        Ok(self.salted.get_or_init(|| salted))
    }
}

impl std::fmt::Debug for PermalinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermalinkService")
            .field("kind", &self.kind)
            .field("dao", &self.dao)
            .finish_non_exhaustive()
    }
}
