use async_trait::async_trait;
use platforms_client::twitch::{TokenResponse, TwitchOAuth};

/// The refresh-token grant used by [`super::CredentialStore`].
#[async_trait]
pub trait TokenGrants: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> platforms_client::Result<TokenResponse>;
}

#[async_trait]
impl TokenGrants for TwitchOAuth {
    async fn refresh(&self, refresh_token: &str) -> platforms_client::Result<TokenResponse> {
        TwitchOAuth::refresh(self, refresh_token).await
    }
}
