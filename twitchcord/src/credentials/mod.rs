//! Broadcaster credential management.
//!
//! - [`CredentialRecord`]: the persisted OAuth token pair
//! - [`TokenGrants`]: the refresh-token grant, implemented by the Twitch OAuth client
//! - [`CredentialStore`]: hands out access tokens, refreshing them single-flight

mod error;
mod grants;
mod store;
mod types;

pub use error::CredentialError;
pub use grants::TokenGrants;
pub use store::{CredentialStore, REFRESH_MARGIN};
pub use types::{CredentialRecord, CredentialStatus};
