use std::fmt;
use std::str::FromStr;

use kvs_types::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The kinds of state a permalink can point at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermalinkKind {
    Dashboard,
    Explore,
    Sqllab,
}

impl PermalinkKind {
    pub const ALL: [PermalinkKind; 3] = [Self::Dashboard, Self::Explore, Self::Sqllab];

    pub fn resource(self) -> Resource {
        match self {
            Self::Dashboard => Resource::DashboardPermalink,
            Self::Explore => Resource::ExplorePermalink,
            Self::Sqllab => Resource::SqllabPermalink,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Explore => "explore",
            Self::Sqllab => "sqllab",
        }
    }

    /// JSON Schema every stored state of this kind must satisfy.
    pub fn schema(self) -> Value {
        match self {
            Self::Dashboard => json!({
                "type": "object",
                "required": ["dashboardId"],
                "properties": {
                    "dashboardId": {"type": "string", "minLength": 1},
                    "state": {"type": "object"}
                }
            }),
            Self::Explore => json!({
                "type": "object",
                "required": ["datasourceId", "datasourceType", "formData"],
                "properties": {
                    "chartId": {"type": ["integer", "null"]},
                    "datasourceId": {"type": "integer"},
                    "datasourceType": {"type": "string"},
                    "formData": {"type": "object"},
                    "urlParams": {"type": "array"}
                }
            }),
            Self::Sqllab => json!({
                "type": "object",
                "required": ["dbId", "sql"],
                "properties": {
                    "dbId": {"type": "integer"},
                    "sql": {"type": "string"},
                    "name": {"type": "string"},
                    "catalog": {"type": ["string", "null"]},
                    "schema": {"type": ["string", "null"]},
                    "autorun": {"type": "boolean"},
                    "templateParams": {"type": ["string", "null"]}
                }
            }),
        }
    }

    /// The identifier handed to the object resolver for `state`.
    ///
    /// - dashboard: the `dashboardId` string
    /// - explore: `chart:<chartId>` when a chart is saved, else
    ///   `datasource:<datasourceId>`
    /// - sqllab: the `dbId`
    pub fn target(self, state: &Value) -> Option<String> {
        match self {
            Self::Dashboard => state
                .get("dashboardId")
                .and_then(Value::as_str)
                .map(str::to_string),
            Self::Explore => match state.get("chartId").and_then(Value::as_i64) {
                Some(chart) => Some(format!("chart:{chart}")),
                None => state
                    .get("datasourceId")
                    .and_then(Value::as_i64)
                    .map(|id| format!("datasource:{id}")),
            },
            Self::Sqllab => state.get("dbId").and_then(Value::as_i64).map(|id| id.to_string()),
        }
    }

    /// The state field [`target`](Self::target) reads.
    pub fn target_field(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboardId",
            Self::Explore => "datasourceId",
            Self::Sqllab => "dbId",
        }
    }
}

impl fmt::Display for PermalinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermalinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown permalink kind: {s:?}"))
    }
}
