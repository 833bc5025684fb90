//! Discord role to Twitch VIP/moderator synchronization.
//!
//! Two paths mutate roles for a broadcaster:
//! - [`RoleChangeReactor`]: event-driven, Discord role change to Twitch mutation
//! - [`ReconciliationSyncer`]: periodic, Twitch lists to Discord role corrections
//!
//! Both take the [`RoleMutationGate`] for the broadcaster before mutating.

mod feed;
mod gate;
mod mapping;
mod platform;
mod reactor;
mod syncer;

#[cfg(test)]
pub(crate) mod testing;

pub use feed::MemberRoleFeed;
pub use gate::RoleMutationGate;
pub use mapping::{RoleMapping, sync_reason};
pub use platform::{DiscordGuild, GuildApi, PrivilegedRoleApi, list_all};
pub use reactor::{
    EVENT_QUEUE_CAPACITY, ItemOutcome, ReactionItem, ReactionReport, RoleChangeEvent,
    RoleChangeHandle, RoleChangeReactor,
};
pub use syncer::{MemberFailure, PassOutcome, ReconciliationSyncer, SyncReport};
