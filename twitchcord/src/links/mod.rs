//! Discord to Twitch identity links.
//!
//! - [`IdentityLink`]: one Discord user bound to one Twitch account
//! - [`IdentityLinkRegistry`]: the durable, atomically replaced link collection
//! - [`LinkingService`]: the Discord OAuth callback that creates links

mod linking;
mod registry;
mod types;

pub use linking::{ConnectionSource, LinkOutcome, LinkingService};
pub use registry::IdentityLinkRegistry;
pub use types::{IdentityLink, UpsertOutcome};
