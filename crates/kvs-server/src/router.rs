use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use kvs_permalink::PermalinkKind;
use kvs_sdk::Kvs;
use kvs_types::Resource;
use tower_http::trace::TraceLayer;

use crate::auth::AuthProvider;
use crate::handler;

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub kvs: Arc<Kvs>,
    pub auth: Arc<dyn AuthProvider>,
    pub kv_resources: Arc<[Resource]>,
}

impl AppState {
    /// Serve the resources listed in the `[server]` section of `kvs`'s config.
    pub fn new(kvs: Arc<Kvs>, auth: Arc<dyn AuthProvider>) -> Self {
        let kv_resources = kvs.config().server.kv_resources.clone().into();
        Self {
            kvs,
            auth,
            kv_resources,
        }
    }
}

/// Build the axum router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/health", get(handler::health_handler))
        .route(
            "/kv/:resource",
            post(handler::kv_create),
        )
        .route(
            "/kv/:resource/:key",
            get(handler::kv_get)
                .put(handler::kv_update)
                .delete(handler::kv_delete),
        );
    for kind in PermalinkKind::ALL {
        api = api.nest(&format!("/{kind}"), permalink_routes(kind));
    }
    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn permalink_routes(kind: PermalinkKind) -> Router<AppState> {
    Router::new()
        .route("/permalink", post(handler::permalink_create))
        .route("/permalink/:key", get(handler::permalink_get))
        .layer(Extension(kind))
}
