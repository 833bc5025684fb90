//! Process configuration from environment variables.
//!
//! `.env` is loaded by `main` through `dotenvy`; everything here reads through a
//! lookup function so tests never touch the real environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiServerConfig;
use crate::roles::RoleMapping;
use crate::{Error, Result};

pub const DEFAULT_TWITCH_REDIRECT_URI: &str = "http://localhost:3000/auth/twitch/callback";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

pub const CREDENTIALS_FILE: &str = "twitch-broadcaster-tokens.json";
pub const LINKS_FILE: &str = "links.json";
pub const LIVE_STATE_FILE: &str = "twitch-state.json";

#[derive(Debug, Clone)]
pub struct TwitchAppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct DiscordOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    pub guild_id: Option<String>,
    pub notify_channel_id: Option<String>,
    pub notify_role_id: Option<String>,
    pub webhook_url: Option<String>,
    pub oauth: Option<DiscordOAuthConfig>,
}

/// What role sync needs, present only when every piece is configured.
#[derive(Debug, Clone)]
pub struct RoleSyncSettings {
    pub broadcaster_id: String,
    pub bot_token: String,
    pub guild_id: String,
    pub mapping: RoleMapping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    Bot { bot_token: String, channel_id: String },
    Webhook { url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub twitch: TwitchAppConfig,
    pub broadcaster_id: Option<String>,
    pub channels: Vec<String>,
    pub discord: DiscordConfig,
    pub role_mapping: RoleMapping,
    pub data_dir: PathBuf,
    pub sync_interval: Duration,
    pub live_poll_interval: Duration,
    pub api: ApiServerConfig,
    pub log_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| Error::config(format!("{key} is required")));

        let twitch = TwitchAppConfig {
            client_id: require("TWITCH_CLIENT_ID")?,
            client_secret: require("TWITCH_CLIENT_SECRET")?,
            redirect_uri: get("TWITCH_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_TWITCH_REDIRECT_URI.to_string()),
        };

        let channels = get("TWITCH_CHANNELS")
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_ascii_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let oauth = match (
            get("DISCORD_OAUTH_CLIENT_ID"),
            get("DISCORD_OAUTH_CLIENT_SECRET"),
            get("DISCORD_OAUTH_REDIRECT"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(DiscordOAuthConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            (None, None, None) => None,
            _ => {
                return Err(Error::config(
                    "DISCORD_OAUTH_CLIENT_ID, DISCORD_OAUTH_CLIENT_SECRET and DISCORD_OAUTH_REDIRECT must be set together",
                ));
            }
        };

        let webhook_url = get("DISCORD_WEBHOOK_URL");
        if let Some(url) = &webhook_url
            && !url.starts_with("https://")
        {
            return Err(Error::config("DISCORD_WEBHOOK_URL must be an https URL"));
        }

        let discord = DiscordConfig {
            bot_token: get("DISCORD_BOT_TOKEN"),
            guild_id: get("DISCORD_GUILD_ID"),
            notify_channel_id: get("DISCORD_NOTIFY_CHANNEL_ID"),
            notify_role_id: get("DISCORD_NOTIFY_ROLE_ID"),
            webhook_url,
            oauth,
        };

        let role_mapping = match get("ROLE_MAPPINGS") {
            Some(raw) => RoleMapping::parse(&raw)?,
            None => RoleMapping::default(),
        };

        let mut api = ApiServerConfig::default();
        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            api.bind_address = bind_address;
        }
        if let Some(port) = get("API_PORT") {
            api.port = port
                .parse()
                .map_err(|_| Error::config(format!("API_PORT `{port}` is not a valid port")))?;
        }

        Ok(Self {
            twitch,
            broadcaster_id: get("TWITCH_BROADCASTER_ID"),
            channels,
            discord,
            role_mapping,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            sync_interval: interval(get("SYNC_INTERVAL_SECS"), "SYNC_INTERVAL_SECS")?,
            live_poll_interval: interval(get("LIVE_POLL_INTERVAL_SECS"), "LIVE_POLL_INTERVAL_SECS")?,
            api,
            log_dir: get("LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
        })
    }

    /// Role sync settings, or the reason it is disabled.
    pub fn role_sync(&self) -> std::result::Result<RoleSyncSettings, &'static str> {
        let broadcaster_id = self
            .broadcaster_id
            .clone()
            .ok_or("TWITCH_BROADCASTER_ID is not set")?;
        let bot_token = self
            .discord
            .bot_token
            .clone()
            .ok_or("DISCORD_BOT_TOKEN is not set")?;
        let guild_id = self
            .discord
            .guild_id
            .clone()
            .ok_or("DISCORD_GUILD_ID is not set")?;
        if self.role_mapping.is_empty() {
            return Err("ROLE_MAPPINGS is empty");
        }
        Ok(RoleSyncSettings {
            broadcaster_id,
            bot_token,
            guild_id,
            mapping: self.role_mapping.clone(),
        })
    }

    /// Where live notices go. The bot channel wins when both are configured.
    pub fn notify_target(&self) -> std::result::Result<NotifyTarget, &'static str> {
        if self.channels.is_empty() {
            return Err("TWITCH_CHANNELS is empty");
        }
        if let (Some(bot_token), Some(channel_id)) =
            (&self.discord.bot_token, &self.discord.notify_channel_id)
        {
            return Ok(NotifyTarget::Bot {
                bot_token: bot_token.clone(),
                channel_id: channel_id.clone(),
            });
        }
        if let Some(url) = &self.discord.webhook_url {
            return Ok(NotifyTarget::Webhook { url: url.clone() });
        }
        Err("neither DISCORD_NOTIFY_CHANNEL_ID with DISCORD_BOT_TOKEN nor DISCORD_WEBHOOK_URL is set")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    pub fn links_path(&self) -> PathBuf {
        self.data_dir.join(LINKS_FILE)
    }

    pub fn live_state_path(&self) -> PathBuf {
        self.data_dir.join(LIVE_STATE_FILE)
    }
}

fn interval(raw: Option<String>, key: &str) -> Result<Duration> {
    let secs = match raw {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| Error::config(format!("{key} `{raw}` is not a number of seconds")))?,
        None => DEFAULT_INTERVAL_SECS,
    };
    if secs == 0 {
        return Err(Error::config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
