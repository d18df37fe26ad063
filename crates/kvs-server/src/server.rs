use std::future::Future;
use std::sync::Arc;

use kvs_sdk::{Kvs, ServerConfig};
use tokio::net::TcpListener;

use crate::auth::{AuthProvider, TrustedHeaderAuth};
use crate::error::{ServerError, ServerResult};
use crate::router::{build_router, AppState};

/// HTTP front end over one [`Kvs`] deployment.
pub struct KvsServer {
    kvs: Arc<Kvs>,
    auth: Arc<dyn AuthProvider>,
}

impl KvsServer {
    /// Users are read from the configured trusted header.
    pub fn new(kvs: Arc<Kvs>) -> Self {
        let auth = Arc::new(TrustedHeaderAuth::new(kvs.config().server.user_header.clone()));
        Self { kvs, auth }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.kvs.config().server
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(self.kvs.clone(), self.auth.clone()))
    }

    /// Serve until the process is stopped.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests and
    /// drop fast store connections.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let app = self.router();
        let addr = self.config().bind_addr;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "kvs server listening");
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));
        self.kvs.shutdown();
        tracing::info!("kvs server stopped");
        served
    }
}
