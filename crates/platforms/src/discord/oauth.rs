//! Discord OAuth2 used for account linking (`identify connections`).

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use super::API_BASE_URL;
use super::models::{Connection, User};
use crate::error::{PlatformError, Result};
use crate::http::check_response;

pub const AUTHORIZE_URL: &str = "https://discord.com/api/oauth2/authorize";
pub const LINK_SCOPES: &str = "identify connections";

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl DiscordToken {
    fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Debug, Clone)]
pub struct DiscordOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DiscordOAuth {
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

    pub fn authorize_url(&self, state: Option<&str>) -> Result<Url> {
        let mut url =
            Url::parse(AUTHORIZE_URL).map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", LINK_SCOPES);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<DiscordToken> {
        let response = self
            .client
            .post(format!("{API_BASE_URL}/oauth2/token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    #[instrument(skip_all)]
    pub async fn current_user(&self, token: &DiscordToken) -> Result<User> {
        let response = self
            .client
            .get(format!("{API_BASE_URL}/users/@me"))
            .header(reqwest::header::AUTHORIZATION, token.authorization())
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    #[instrument(skip_all)]
    pub async fn connections(&self, token: &DiscordToken) -> Result<Vec<Connection>> {
        let response = self
            .client
            .get(format!("{API_BASE_URL}/users/@me/connections"))
            .header(reqwest::header::AUTHORIZATION, token.authorization())
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_url_requests_connections_scope() {
        crate::http::install_rustls_provider();
        let oauth = DiscordOAuth::new(Client::new(), "app", "secret", "http://host/discord/callback");
        let url = oauth.authorize_url(Some("state-1")).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), LINK_SCOPES.into())));
        assert!(pairs.contains(&("state".into(), "state-1".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://host/discord/callback".into()
        )));
    }

    #[test]
    fn test_connection_parse() {
        let conns: Vec<Connection> = serde_json::from_str(
            r#"[{"type":"youtube","id":"y","name":"yt"},{"type":"twitch","id":"55","name":"SomeLogin","verified":true}]"#,
        )
        .unwrap();
        let twitch = conns.iter().find(|c| c.is_twitch()).unwrap();
        assert_eq!(twitch.id, "55");
        assert_eq!(twitch.name, "SomeLogin");
    }
}
