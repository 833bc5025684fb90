//! `id.twitch.tv` OAuth2 flows: authorization code, refresh token and client credentials.

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{PlatformError, Result};
use crate::http::check_response;

pub const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";
pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Token endpoint response shared by all grant types.
///
/// Client-credentials responses carry neither a refresh token nor scopes.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default, deserialize_with = "scope_list")]
    pub scope: Vec<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Twitch returns `scope` as an array; some proxies flatten it to a space-separated string.
fn scope_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scope {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Scope>::deserialize(deserializer)? {
        Some(Scope::List(list)) => list,
        Some(Scope::Joined(s)) => s.split_whitespace().map(str::to_string).collect(),
        None => Vec::new(),
    })
}

#[derive(Debug, Clone)]
pub struct TwitchOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TwitchOAuth {
    pub fn new(
        client: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// URL the broadcaster is redirected to for interactive authorization.
    pub fn authorize_url(&self, scopes: &[&str], state: Option<&str>) -> Result<Url> {
        let mut url =
            Url::parse(AUTHORIZE_URL).map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &scopes.join(" "));
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for a user token pair.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Refresh-token grant. Twitch may or may not rotate the refresh token.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// Client-credentials grant for an app access token.
    #[instrument(skip(self))]
    pub async fn client_credentials(&self) -> Result<TokenResponse> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self.client.post(TOKEN_URL).form(form).send().await?;
        let response = check_response(response).await?;
        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Token endpoint responded");
        Ok(token)
    }
}
