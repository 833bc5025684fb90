//! Live-stream announcements.
//!
//! [`LiveNotice`] is what the tracker emits; a [`NotificationChannel`] delivers it.

pub mod channels;

use chrono::{DateTime, Utc};
use platforms_client::twitch::Stream;

pub use channels::{DiscordBotChannel, NotificationChannel, WebhookChannel};

const DEFAULT_TITLE: &str = "Live now!";

/// A channel that just went live (or restarted its stream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveNotice {
    pub login: String,
    pub stream_id: String,
    pub title: String,
    pub game_name: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl LiveNotice {
    pub fn from_stream(login: &str, stream: &Stream) -> Self {
        Self {
            login: login.to_ascii_lowercase(),
            stream_id: stream.id.clone(),
            title: stream.title.clone(),
            game_name: stream.game_name.clone(),
            started_at: stream.started_at,
        }
    }

    pub fn url(&self) -> String {
        format!("https://twitch.tv/{}", self.login)
    }

    /// Message text, optionally pinging a Discord role first.
    pub fn message(&self, mention_role_id: Option<&str>) -> String {
        let mention = mention_role_id
            .map(|id| format!("<@&{id}> "))
            .unwrap_or_default();
        let title = if self.title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            self.title.as_str()
        };
        format!(
            "{mention}🔴 **{}** is LIVE: **{title}**\n{}",
            self.login,
            self.url()
        )
    }
}
