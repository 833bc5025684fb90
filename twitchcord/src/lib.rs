//! twitchcord library crate.
//!
//! Discord/Twitch identity linking, privileged-role synchronisation and
//! go-live notifications. Exposed as a library for integration testing.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod links;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod persist;
pub mod roles;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
