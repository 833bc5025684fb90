//! Account linking through Discord OAuth (`identify connections`).

use std::sync::Arc;

use async_trait::async_trait;
use platforms_client::discord::{Connection, DiscordOAuth, User};
use tracing::{info, instrument, warn};
use url::Url;

use super::registry::IdentityLinkRegistry;
use super::types::{IdentityLink, UpsertOutcome};
use crate::Result;

/// Discord side of the linking flow.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    fn authorize_url(&self, state: Option<&str>) -> Result<Url>;

    /// Exchange an authorization code for the user and their connected accounts.
    async fn user_connections(&self, code: &str) -> Result<(User, Vec<Connection>)>;
}

#[async_trait]
impl ConnectionSource for DiscordOAuth {
    fn authorize_url(&self, state: Option<&str>) -> Result<Url> {
        Ok(DiscordOAuth::authorize_url(self, state)?)
    }

    async fn user_connections(&self, code: &str) -> Result<(User, Vec<Connection>)> {
        let token = self.exchange_code(code).await?;
        let user = self.current_user(&token).await?;
        let connections = self.connections(&token).await?;
        Ok((user, connections))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked {
        link: IdentityLink,
        outcome: UpsertOutcome,
    },
    NoTwitchConnection {
        discord_user_id: String,
        username: String,
    },
}

pub struct LinkingService {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<IdentityLinkRegistry>,
}

impl LinkingService {
    pub fn new(source: Arc<dyn ConnectionSource>, registry: Arc<IdentityLinkRegistry>) -> Self {
        Self { source, registry }
    }

    pub fn authorize_url(&self, state: Option<&str>) -> Result<Url> {
        self.source.authorize_url(state)
    }

    /// Complete the OAuth callback and store the user's Twitch connection.
    #[instrument(skip_all)]
    pub async fn complete(&self, code: &str) -> Result<LinkOutcome> {
        let (user, connections) = self.source.user_connections(code).await?;

        let Some(twitch) = connections.iter().find(|c| c.is_twitch()) else {
            warn!(discord_user_id = %user.id, "Discord user has no Twitch connection");
            return Ok(LinkOutcome::NoTwitchConnection {
                discord_user_id: user.id,
                username: user.username,
            });
        };
        if twitch.id.is_empty() {
            warn!(
                discord_user_id = %user.id,
                twitch_login = %twitch.name,
                "Twitch connection has no user id; role mutations will skip this link"
            );
        }

        let link = IdentityLink::new(&user.id, &twitch.id, &twitch.name);
        let outcome = self.registry.upsert(link.clone()).await?;
        info!(
            discord_user_id = %link.discord_user_id,
            twitch_login = %link.twitch_login,
            "Discord account linked to Twitch"
        );
        Ok(LinkOutcome::Linked { link, outcome })
    }
}
