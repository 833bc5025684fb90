//! Shared HTTP client construction and response checking.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response};
use tracing::debug;

use crate::error::{PlatformError, Result};

/// Timeout applied to every outbound request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

const USER_AGENT: &str = concat!("twitchcord/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// A client builder preconfigured with the standard timeout and user agent.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    install_rustls_provider();
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
}

/// Build the default client, falling back to reqwest defaults if the builder fails.
pub fn default_client() -> Client {
    create_client_builder(None)
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "Failed to build HTTP client; falling back to defaults");
            Client::new()
        })
}

/// Turn a non-success response into [`PlatformError::Api`] with a truncated body.
pub async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::api(status.as_u16(), &body))
}
