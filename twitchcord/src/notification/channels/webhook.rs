//! Discord incoming-webhook announcement.

use async_trait::async_trait;
use platforms_client::discord::DiscordRest;
use tracing::debug;

use super::NotificationChannel;
use crate::Result;
use crate::notification::LiveNotice;

pub struct WebhookChannel {
    rest: DiscordRest,
    webhook_url: String,
    username: Option<String>,
    mention_role_id: Option<String>,
}

impl WebhookChannel {
    pub fn new(rest: DiscordRest, webhook_url: impl Into<String>, mention_role_id: Option<String>) -> Self {
        Self {
            rest,
            webhook_url: webhook_url.into(),
            username: Some("twitchcord".to_string()),
            mention_role_id: mention_role_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.webhook_url.starts_with("https://")
    }

    async fn send(&self, notice: &LiveNotice) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let content = notice.message(self.mention_role_id.as_deref());
        self.rest
            .execute_webhook(&self.webhook_url, &content, self.username.as_deref())
            .await?;
        debug!(login = %notice.login, "Webhook live notice sent");
        Ok(())
    }
}
