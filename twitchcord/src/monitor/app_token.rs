use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::status::StreamStatusApi;

/// Subtracted from the advertised lifetime so a token is never used at its edge.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// In-memory client-credentials token, owned by one tracker.
#[derive(Debug, Default)]
pub struct AppTokenCache {
    token: Option<(String, Instant)>,
}

impl AppTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, or a new one when none is cached or it has expired.
    pub async fn get(&mut self, api: &dyn StreamStatusApi) -> platforms_client::Result<String> {
        if let Some((token, expires_at)) = &self.token
            && Instant::now() < *expires_at
        {
            return Ok(token.clone());
        }

        let response = api.app_token().await?;
        let lifetime = Duration::from_secs(response.expires_in.max(0) as u64).saturating_sub(EXPIRY_SLACK);
        debug!(lifetime_secs = lifetime.as_secs(), "Obtained Twitch app token");
        self.token = Some((response.access_token.clone(), Instant::now() + lifetime));
        Ok(response.access_token)
    }

    pub fn evict(&mut self) {
        self.token = None;
    }

    pub fn is_cached(&self) -> bool {
        self.token.is_some()
    }
}
