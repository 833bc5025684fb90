//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use platforms_client::twitch::TwitchOAuth;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::links::LinkingService;
use crate::logging::LoggingConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: false,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub twitch_oauth: Arc<TwitchOAuth>,
    pub credentials: Arc<CredentialStore>,
    /// `None` when Discord OAuth is not configured.
    pub linking: Option<Arc<LinkingService>>,
    /// `None` when the process did not install the reloadable subscriber.
    pub logging: Option<Arc<LoggingConfig>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(twitch_oauth: Arc<TwitchOAuth>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            twitch_oauth,
            credentials,
            linking: None,
            logging: None,
            start_time: Instant::now(),
        }
    }

    pub fn with_linking(mut self, linking: Arc<LinkingService>) -> Self {
        self.linking = Some(linking);
        self
    }

    pub fn with_logging(mut self, logging: Arc<LoggingConfig>) -> Self {
        self.logging = Some(logging);
        self
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid API address: {e}")))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Other(format!("Failed to bind {addr}: {e}")))?;

        tracing::info!("API server listening on http://{}", addr);
        tracing::info!("Authorize the broadcaster at http://{}/auth/twitch/start", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {e}")))?;

        Ok(())
    }
}
