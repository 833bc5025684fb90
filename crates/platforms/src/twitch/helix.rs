//! Helix endpoints for privileged-role management and stream status.

use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, instrument};

use super::models::{ChannelRole, Page, RoleMember, Stream};
use crate::error::{PlatformError, Result};
use crate::http::check_response;

pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Page size requested from cursor-paginated listings (Helix maximum).
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    Grant,
    Revoke,
}

impl RoleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "add",
            Self::Revoke => "remove",
        }
    }
}

impl std::fmt::Display for RoleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a role mutation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The remote state changed.
    Applied,
    /// The remote state already matched the request.
    AlreadySatisfied,
}

/// Interpret a failed add/remove call.
///
/// Helix rejects redundant mutations ("user is already a VIP", "user is not a mod")
/// with 400 or 422. Those mean the requested state already holds.
pub fn classify_mutation_error(action: RoleAction, err: PlatformError) -> Result<MutationOutcome> {
    let PlatformError::Api { status, body } = &err else {
        return Err(err);
    };
    if !matches!(status, 400 | 422) {
        return Err(err);
    }

    let body = body.to_ascii_lowercase();
    let redundant = match action {
        RoleAction::Grant => {
            body.contains("already a vip")
                || body.contains("already a mod")
                || body.contains("already a moderator")
        }
        RoleAction::Revoke => {
            body.contains("not a vip")
                || body.contains("not a mod")
                || body.contains("not a moderator")
        }
    };

    if redundant {
        Ok(MutationOutcome::AlreadySatisfied)
    } else {
        Err(err)
    }
}

#[derive(Debug, Clone)]
pub struct HelixClient {
    client: Client,
    client_id: String,
    base_url: String,
}

impl HelixClient {
    pub fn new(client: Client, client_id: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            base_url: HELIX_BASE_URL.to_string(),
        }
    }

    /// Override the API base (used against local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
    }

    /// Fetch one page of the VIP or moderator list.
    #[instrument(skip(self, token), fields(role = %role))]
    pub async fn list_role_page(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        after: Option<&str>,
    ) -> Result<Page<RoleMember>> {
        let mut query = vec![("broadcaster_id", broadcaster_id), ("first", PAGE_SIZE)];
        if let Some(cursor) = after {
            query.push(("after", cursor));
        }

        let response = self
            .request(Method::GET, role.endpoint(), token)
            .query(&query)
            .send()
            .await?;
        let page: Page<RoleMember> = check_response(response).await?.json().await?;
        debug!(count = page.data.len(), has_more = page.next_cursor().is_some(), "Fetched role page");
        Ok(page)
    }

    /// Add `user_id` to the role; redundant grants resolve to [`MutationOutcome::AlreadySatisfied`].
    #[instrument(skip(self, token), fields(role = %role))]
    pub async fn grant(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> Result<MutationOutcome> {
        self.mutate(Method::POST, RoleAction::Grant, token, broadcaster_id, role, user_id)
            .await
    }

    /// Remove `user_id` from the role; redundant removals resolve to [`MutationOutcome::AlreadySatisfied`].
    #[instrument(skip(self, token), fields(role = %role))]
    pub async fn revoke(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> Result<MutationOutcome> {
        self.mutate(Method::DELETE, RoleAction::Revoke, token, broadcaster_id, role, user_id)
            .await
    }

    async fn mutate(
        &self,
        method: Method,
        action: RoleAction,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> Result<MutationOutcome> {
        let response = self
            .request(method, role.endpoint(), token)
            .query(&[("broadcaster_id", broadcaster_id), ("user_id", user_id)])
            .send()
            .await?;

        match check_response(response).await {
            Ok(_) => Ok(MutationOutcome::Applied),
            Err(err) => classify_mutation_error(action, err),
        }
    }

    /// Current stream for `login`, or `None` when the channel is offline.
    #[instrument(skip(self, token))]
    pub async fn stream_by_login(&self, token: &str, login: &str) -> Result<Option<Stream>> {
        let response = self
            .request(Method::GET, "streams", token)
            .query(&[("user_login", login)])
            .send()
            .await?;
        let page: Page<Stream> = check_response(response).await?.json().await?;
        Ok(page.data.into_iter().next())
    }
}
