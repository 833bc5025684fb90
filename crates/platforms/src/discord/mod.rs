//! Discord REST, OAuth and gateway bindings.

pub mod gateway;
mod models;
pub mod oauth;
pub mod rest;

pub use gateway::{GatewayClient, GatewayConfig, GatewayEvent};
pub use models::{Connection, GuildMember, User};
pub use oauth::{DiscordOAuth, DiscordToken};
pub use rest::DiscordRest;

pub const API_BASE_URL: &str = "https://discord.com/api/v10";
