use async_trait::async_trait;
use platforms_client::twitch::{HelixClient, Stream, TokenResponse, TwitchOAuth};

/// Public stream lookups with an app (client-credentials) token.
#[async_trait]
pub trait StreamStatusApi: Send + Sync {
    async fn app_token(&self) -> platforms_client::Result<TokenResponse>;

    async fn live_stream(&self, app_token: &str, login: &str) -> platforms_client::Result<Option<Stream>>;
}

pub struct TwitchStreamStatus {
    oauth: TwitchOAuth,
    helix: HelixClient,
}

impl TwitchStreamStatus {
    pub fn new(oauth: TwitchOAuth, helix: HelixClient) -> Self {
        Self { oauth, helix }
    }
}

#[async_trait]
impl StreamStatusApi for TwitchStreamStatus {
    async fn app_token(&self) -> platforms_client::Result<TokenResponse> {
        self.oauth.client_credentials().await
    }

    async fn live_stream(&self, app_token: &str, login: &str) -> platforms_client::Result<Option<Stream>> {
        self.helix.stream_by_login(app_token, login).await
    }
}
