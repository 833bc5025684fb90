//! Bot-authored announcement in a Discord text channel.

use async_trait::async_trait;
use platforms_client::discord::DiscordRest;
use tracing::debug;

use super::NotificationChannel;
use crate::Result;
use crate::notification::LiveNotice;

pub struct DiscordBotChannel {
    rest: DiscordRest,
    channel_id: String,
    mention_role_id: Option<String>,
}

impl DiscordBotChannel {
    pub fn new(rest: DiscordRest, channel_id: impl Into<String>, mention_role_id: Option<String>) -> Self {
        Self {
            rest,
            channel_id: channel_id.into(),
            mention_role_id: mention_role_id.filter(|id| !id.is_empty()),
        }
    }

    /// Only the configured role may be pinged.
    fn allowed_roles(&self) -> Vec<String> {
        self.mention_role_id.iter().cloned().collect()
    }
}

#[async_trait]
impl NotificationChannel for DiscordBotChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    fn is_enabled(&self) -> bool {
        !self.channel_id.is_empty()
    }

    async fn send(&self, notice: &LiveNotice) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let content = notice.message(self.mention_role_id.as_deref());
        self.rest
            .create_message(&self.channel_id, &content, &self.allowed_roles())
            .await?;
        debug!(channel_id = %self.channel_id, login = %notice.login, "Discord live notice sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    #[test]
    fn test_empty_mention_is_ignored() {
        platforms_client::http::install_rustls_provider();
        let rest = DiscordRest::new(Client::new(), "token");
        let channel = DiscordBotChannel::new(rest.clone(), "123", Some(String::new()));
        assert!(channel.allowed_roles().is_empty());

        let channel = DiscordBotChannel::new(rest.clone(), "123", Some("777".into()));
        assert_eq!(channel.allowed_roles(), vec!["777".to_string()]);

        assert!(!DiscordBotChannel::new(rest, "", None).is_enabled());
    }
}
