//! Notification channels.
//!
//! - Discord bot message in a text channel
//! - Discord incoming webhook

mod discord;
mod webhook;

pub use discord::DiscordBotChannel;
pub use webhook::WebhookChannel;

use async_trait::async_trait;

use super::LiveNotice;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver a live notice. An error means it was not delivered.
    async fn send(&self, notice: &LiveNotice) -> Result<()>;
}
