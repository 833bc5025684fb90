//! Bot-authenticated Discord REST calls: member enumeration, role mutation, messages.

use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;
use tracing::{debug, instrument};

use super::API_BASE_URL;
use super::models::GuildMember;
use crate::error::Result;
use crate::http::check_response;

/// Maximum page size for `GET /guilds/{id}/members`.
const MEMBER_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct DiscordRest {
    client: Client,
    bot_token: String,
    base_url: String,
}

impl DiscordRest {
    pub fn new(client: Client, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            bot_token: bot_token.into(),
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Override the API base (used against local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token),
            )
    }

    /// Enumerate every member of the guild, following the `after` cursor to the end.
    #[instrument(skip(self))]
    pub async fn list_guild_members(&self, guild_id: &str) -> Result<Vec<GuildMember>> {
        let mut members = Vec::new();
        let mut after: Option<String> = None;
        let limit = MEMBER_PAGE_LIMIT.to_string();

        loop {
            let mut query = vec![("limit", limit.as_str())];
            if let Some(ref last) = after {
                query.push(("after", last.as_str()));
            }

            let response = self
                .request(Method::GET, &format!("/guilds/{guild_id}/members"))
                .query(&query)
                .send()
                .await?;
            let page: Vec<GuildMember> = check_response(response).await?.json().await?;
            let page_len = page.len();

            after = page.last().and_then(|m| m.user_id()).map(str::to_string);
            members.extend(page);

            if page_len < MEMBER_PAGE_LIMIT || after.is_none() {
                break;
            }
        }

        debug!(count = members.len(), "Enumerated guild members");
        Ok(members)
    }

    #[instrument(skip(self, reason))]
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<()> {
        let response = self
            .request(
                Method::PUT,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
            )
            .header("X-Audit-Log-Reason", reason)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    #[instrument(skip(self, reason))]
    pub async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
            )
            .header("X-Audit-Log-Reason", reason)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    /// Post a plain-text message; only the listed roles may be pinged.
    #[instrument(skip(self, content))]
    pub async fn create_message(
        &self,
        channel_id: &str,
        content: &str,
        mention_roles: &[String],
    ) -> Result<()> {
        let payload = json!({
            "content": content,
            "allowed_mentions": { "parse": [], "roles": mention_roles },
        });
        let response = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(&payload)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    /// Execute an incoming webhook. Webhook URLs carry their own secret, so no bot token is sent.
    #[instrument(skip_all)]
    pub async fn execute_webhook(
        &self,
        webhook_url: &str,
        content: &str,
        username: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({ "content": content });
        if let Some(username) = username {
            payload["username"] = json!(username);
        }
        let response = self.client.post(webhook_url).json(&payload).send().await?;
        check_response(response).await?;
        Ok(())
    }
}
