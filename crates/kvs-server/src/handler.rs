use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use kvs_permalink::PermalinkKind;
use kvs_types::{Key, KeyValueEntry, Resource, UserId};
use serde_json::{json, Value};

use crate::error::{ServerError, ServerResult};
use crate::kv::{self, KvRequest};
use crate::router::AppState;

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "kvs-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- KV surface ----

pub async fn kv_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    body: Result<Json<KvRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let resource = state.kv_resource(&resource)?;
    let request = json_body(body)?;
    let dao = state.kvs.dao().as_user(state.user(&headers).await?);
    let entry = blocking(move || kv::create(&dao, resource, request)).await?;
    Ok((StatusCode::CREATED, Json(entry_ref(&entry))).into_response())
}

pub async fn kv_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((resource, key)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let resource = state.kv_resource(&resource)?;
    let key = parse_key(&key)?;
    let dao = state.kvs.dao().as_user(state.user(&headers).await?);
    let value = blocking(move || Ok(kv::read(&dao, resource, &key)?)).await?;
    match value {
        Some(value) => Ok(Json(json!({ "value": value }))),
        None => Err(ServerError::NotFound(format!("{resource}/{key}"))),
    }
}

pub async fn kv_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((resource, key)): Path<(String, String)>,
    body: Result<Json<KvRequest>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let resource = state.kv_resource(&resource)?;
    let key = parse_key(&key)?;
    let request = json_body(body)?;
    let dao = state.kvs.dao().as_user(state.user(&headers).await?);
    let entry = blocking(move || kv::update(&dao, resource, &key, request)).await?;
    Ok(Json(entry_ref(&entry)))
}

pub async fn kv_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((resource, key)): Path<(String, String)>,
) -> ServerResult<Json<Value>> {
    let resource = state.kv_resource(&resource)?;
    let key = parse_key(&key)?;
    let dao = state.kvs.dao().as_user(state.user(&headers).await?);
    let removed = blocking(move || Ok(kv::delete(&dao, resource, &key)?)).await?;
    if removed {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(ServerError::NotFound(format!("{resource}/{key}")))
    }
}

// ---- Permalink surface ----

pub async fn permalink_create(
    State(state): State<AppState>,
    Extension(kind): Extension<PermalinkKind>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Response> {
    let body = json_body(body)?;
    let user = state.user(&headers).await?;
    let kvs = state.kvs.clone();
    let handle =
        blocking(move || Ok(kvs.permalinks(kind).create_as(user, &body)?)).await?;
    let url = permalink_url(&state.kvs.config().permalink_url_base, kind, &handle);
    Ok((StatusCode::CREATED, Json(json!({ "key": handle, "url": url }))).into_response())
}

pub async fn permalink_get(
    State(state): State<AppState>,
    Extension(kind): Extension<PermalinkKind>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> ServerResult<Json<Value>> {
    let user = state.user(&headers).await?;
    let kvs = state.kvs.clone();
    let lookup = key.clone();
    let found =
        blocking(move || Ok(kvs.permalinks(kind).get_as(user, &lookup)?)).await?;
    found
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("{kind} permalink {key}")))
}

/// Where the UI opens a permalink.
pub fn permalink_url(base: &str, kind: PermalinkKind, handle: &str) -> String {
    format!("{}/{kind}/p/{handle}/", base.trim_end_matches('/'))
}

// ---- Helpers ----

impl AppState {
    fn kv_resource(&self, tag: &str) -> ServerResult<Resource> {
        tag.parse::<Resource>()
            .ok()
            .filter(|r| self.kv_resources.contains(r))
            .ok_or_else(|| ServerError::NotFound(format!("resource {tag:?}")))
    }

    async fn user(&self, headers: &HeaderMap) -> ServerResult<Option<UserId>> {
        self.auth.authenticate(headers).await
    }
}

fn parse_key(segment: &str) -> ServerResult<Key> {
    segment
        .parse::<Key>()
        .map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ServerResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

fn entry_ref(entry: &KeyValueEntry) -> Value {
    json!({ "id": entry.id, "uuid": entry.uuid })
}

/// Store calls block; keep them off the async workers.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("store task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permalink_url_joins_base() {
        assert_eq!(
            permalink_url("https://bi.example.com/", PermalinkKind::Dashboard, "abc"),
            "https://bi.example.com/dashboard/p/abc/"
        );
        assert_eq!(permalink_url("", PermalinkKind::Sqllab, "abc"), "/sqllab/p/abc/");
    }

    #[test]
    fn keys_parse_as_id_or_uuid() {
        assert_eq!(parse_key("12").unwrap(), Key::Id(12));
        assert!(matches!(parse_key("nope"), Err(ServerError::BadRequest(_))));
    }
}
