use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Logical partition of the key-value store.
///
/// The set is closed: adding a member is a code change. Each member has a
/// stable string tag that is what gets persisted in the `resource` column,
/// so tags must never be renamed once data has been written under them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Shared, bootstrapped singletons such as permalink salts.
    App,
    DashboardPermalink,
    ExplorePermalink,
    SqllabPermalink,
    MetastoreCache,
    Lock,
    /// Generic values exposed over the KV REST surface.
    Kv,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Self::App,
        Self::DashboardPermalink,
        Self::ExplorePermalink,
        Self::SqllabPermalink,
        Self::MetastoreCache,
        Self::Lock,
        Self::Kv,
    ];

    /// The persisted tag.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::DashboardPermalink => "dashboard_permalink",
            Self::ExplorePermalink => "explore_permalink",
            Self::SqllabPermalink => "sqllab_permalink",
            Self::MetastoreCache => "metastore_cache",
            Self::Lock => "lock",
            Self::Kv => "kv",
        }
    }

    /// Returns `true` for resources whose entries are addressed by salted handles.
    pub const fn is_permalink(self) -> bool {
        matches!(
            self,
            Self::DashboardPermalink | Self::ExplorePermalink | Self::SqllabPermalink
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Resource {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.tag() == s)
            .ok_or_else(|| TypeError::UnknownResource(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<&str> = Resource::ALL.iter().map(|r| r.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), Resource::ALL.len());
    }

    #[test]
    fn parse_roundtrip() {
        for r in Resource::ALL {
            assert_eq!(r.tag().parse::<Resource>().unwrap(), r);
        }
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            "dashboard".parse::<Resource>(),
            Err(TypeError::UnknownResource("dashboard".into()))
        );
    }

    #[test]
    fn serde_matches_tag() {
        for r in Resource::ALL {
            let json = serde_json::to_string(&r).unwrap();
            assert_eq!(json, format!("\"{}\"", r.tag()));
        }
    }

    #[test]
    fn permalink_resources() {
        assert!(Resource::DashboardPermalink.is_permalink());
        assert!(Resource::SqllabPermalink.is_permalink());
        assert!(!Resource::Lock.is_permalink());
        assert!(!Resource::App.is_permalink());
    }
}
