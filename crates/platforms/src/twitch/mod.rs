//! Twitch OAuth and Helix bindings.

pub mod helix;
mod models;
pub mod oauth;

pub use helix::{HelixClient, MutationOutcome, RoleAction, classify_mutation_error};
pub use models::{ChannelRole, Page, Pagination, RoleMember, Stream};
pub use oauth::{TokenResponse, TwitchOAuth};
