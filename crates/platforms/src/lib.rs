//! Typed bindings for the Twitch and Discord endpoints used by twitchcord.
//!
//! The crate is stateless: callers pass tokens in and receive typed results
//! or a [`PlatformError`]. Credential caching, persistence and scheduling live
//! in the application crate.

pub mod discord;
pub mod error;
pub mod http;
pub mod twitch;

pub use error::{PlatformError, Result};
