//! Platform surfaces used by the reactor and the syncer.

use std::collections::HashSet;

use async_trait::async_trait;
use platforms_client::discord::{DiscordRest, GuildMember};
use platforms_client::twitch::{ChannelRole, HelixClient, MutationOutcome, Page, RoleMember};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Twitch VIP and moderator management for one broadcaster.
#[async_trait]
pub trait PrivilegedRoleApi: Send + Sync {
    async fn list_page(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        after: Option<&str>,
    ) -> platforms_client::Result<Page<RoleMember>>;

    async fn grant(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome>;

    async fn revoke(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome>;
}

#[async_trait]
impl PrivilegedRoleApi for HelixClient {
    async fn list_page(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        after: Option<&str>,
    ) -> platforms_client::Result<Page<RoleMember>> {
        self.list_role_page(token, broadcaster_id, role, after).await
    }

    async fn grant(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        HelixClient::grant(self, token, broadcaster_id, role, user_id).await
    }

    async fn revoke(
        &self,
        token: &str,
        broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        HelixClient::revoke(self, token, broadcaster_id, role, user_id).await
    }
}

/// Fetch every holder of `role`, following the cursor until the last page.
///
/// A cursor served twice means the list cannot be completed and is an error.
pub async fn list_all(
    api: &dyn PrivilegedRoleApi,
    token: &str,
    broadcaster_id: &str,
    role: ChannelRole,
) -> Result<Vec<RoleMember>> {
    let mut members = Vec::new();
    let mut seen_cursors = HashSet::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = api
            .list_page(token, broadcaster_id, role, cursor.as_deref())
            .await?;
        members.extend(page.data.iter().cloned());

        match page.next_cursor() {
            Some(next) if seen_cursors.insert(next.to_string()) => cursor = Some(next.to_string()),
            Some(next) => {
                warn!(%role, cursor = next, fetched = members.len(), "Helix repeated a cursor; list is incomplete");
                return Err(Error::Other(format!(
                    "Helix repeated pagination cursor {next} while listing {role}s"
                )));
            }
            None => break,
        }
    }

    debug!(%role, count = members.len(), "Fetched complete role list");
    Ok(members)
}

/// Discord guild membership and role assignment.
#[async_trait]
pub trait GuildApi: Send + Sync {
    async fn members(&self) -> Result<Vec<GuildMember>>;
    async fn add_role(&self, user_id: &str, role_id: &str, reason: &str) -> Result<()>;
    async fn remove_role(&self, user_id: &str, role_id: &str, reason: &str) -> Result<()>;
}

/// [`GuildApi`] bound to one guild through the bot REST client.
#[derive(Debug, Clone)]
pub struct DiscordGuild {
    rest: DiscordRest,
    guild_id: String,
}

impl DiscordGuild {
    pub fn new(rest: DiscordRest, guild_id: impl Into<String>) -> Self {
        Self {
            rest,
            guild_id: guild_id.into(),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }
}

#[async_trait]
impl GuildApi for DiscordGuild {
    async fn members(&self) -> Result<Vec<GuildMember>> {
        Ok(self.rest.list_guild_members(&self.guild_id).await?)
    }

    async fn add_role(&self, user_id: &str, role_id: &str, reason: &str) -> Result<()> {
        Ok(self
            .rest
            .add_member_role(&self.guild_id, user_id, role_id, reason)
            .await?)
    }

    async fn remove_role(&self, user_id: &str, role_id: &str, reason: &str) -> Result<()> {
        Ok(self
            .rest
            .remove_member_role(&self.guild_id, user_id, role_id, reason)
            .await?)
    }
}
