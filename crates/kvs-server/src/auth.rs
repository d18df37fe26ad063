use async_trait::async_trait;
use axum::http::HeaderMap;
use kvs_types::UserId;

use crate::error::{ServerError, ServerResult};

/// Resolves the acting user of a request. `Ok(None)` is an anonymous caller.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> ServerResult<Option<UserId>>;
}

/// Trusts a numeric user id set by an authenticating proxy in front of the
/// server. A missing header is anonymous; a malformed one is rejected.
#[derive(Clone, Debug)]
pub struct TrustedHeaderAuth {
    header: String,
}

impl TrustedHeaderAuth {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }
}

#[async_trait]
impl AuthProvider for TrustedHeaderAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> ServerResult<Option<UserId>> {
        let Some(value) = headers.get(self.header.as_str()) else {
            return Ok(None);
        };
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|id| Some(UserId(id)))
            .ok_or_else(|| ServerError::AuthFailed(format!("malformed {} header", self.header)))
    }
}

/// Every request is anonymous.
pub struct AnonymousAuth;

#[async_trait]
impl AuthProvider for AnonymousAuth {
    async fn authenticate(&self, _headers: &HeaderMap) -> ServerResult<Option<UserId>> {
        Ok(None)
    }
}
