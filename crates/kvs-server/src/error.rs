use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kvs_dao::KvError;
use kvs_permalink::PermalinkError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Permalink(#[from] PermalinkError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        let code = match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::AuthFailed(_) => 401,
            Self::Kv(err) => err.kind().http_status(),
            Self::Permalink(err) => err.http_status(),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::AuthFailed(_) => "unauthorized",
            Self::Kv(err) => err.kind().as_str(),
            Self::Permalink(err) => match err.cause() {
                Some(cause) => cause.kind().as_str(),
                None => err.kind().as_str(),
            },
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, source = ?std::error::Error::source(&self), "request failed");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kvs_types::{Key, Resource};

    #[test]
    fn status_follows_error_kind() {
        let missing = ServerError::from(KvError::NotFound {
            resource: Resource::Kv,
            key: Key::Id(1),
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), "not_found");

        let duplicate = ServerError::from(KvError::DuplicateKey {
            resource: Resource::Kv,
            key: Key::Id(1),
        });
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            ServerError::AuthFailed("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
