//! Turns gateway member dispatches into [`RoleChangeEvent`]s.
//!
//! Member updates carry only the new role set, so the feed keeps the last
//! known set per member. The cache is seeded from one member enumeration.

use std::collections::HashSet;

use dashmap::DashMap;
use platforms_client::discord::GatewayEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::platform::GuildApi;
use super::reactor::{RoleChangeEvent, RoleChangeHandle};
use crate::Result;

pub struct MemberRoleFeed {
    guild_id: String,
    roles: DashMap<String, HashSet<String>>,
    reactor: RoleChangeHandle,
}

impl MemberRoleFeed {
    pub fn new(guild_id: impl Into<String>, reactor: RoleChangeHandle) -> Self {
        Self {
            guild_id: guild_id.into(),
            roles: DashMap::new(),
            reactor,
        }
    }

    /// Fill the cache from a full member listing. Returns the number of members cached.
    pub async fn seed(&self, guild: &dyn GuildApi) -> Result<usize> {
        let members = guild.members().await?;
        for member in members {
            if let Some(id) = member.user_id() {
                self.roles
                    .insert(id.to_string(), member.roles.iter().cloned().collect());
            }
        }
        info!(guild_id = %self.guild_id, members = self.roles.len(), "Member role cache seeded");
        Ok(self.roles.len())
    }

    /// Apply one dispatch. Returns the event handed to the reactor, if any.
    pub async fn handle(&self, event: GatewayEvent) -> Result<Option<RoleChangeEvent>> {
        match event {
            GatewayEvent::Ready { session_id } => {
                debug!(%session_id, "Gateway session ready");
                Ok(None)
            }
            GatewayEvent::MemberAdd { guild_id, user_id, roles } if guild_id == self.guild_id => {
                self.roles.insert(user_id, roles.into_iter().collect());
                Ok(None)
            }
            GatewayEvent::MemberRemove { guild_id, user_id } if guild_id == self.guild_id => {
                self.roles.remove(&user_id);
                Ok(None)
            }
            GatewayEvent::MemberUpdate { guild_id, user_id, roles } if guild_id == self.guild_id => {
                let after: HashSet<String> = roles.into_iter().collect();
                let Some(before) = self.roles.insert(user_id.clone(), after.clone()) else {
                    debug!(discord_user_id = %user_id, "First sighting of member; cached without a delta");
                    return Ok(None);
                };
                if before == after {
                    return Ok(None);
                }
                let event = RoleChangeEvent {
                    discord_user_id: user_id,
                    before,
                    after,
                };
                self.reactor.submit(event.clone()).await?;
                Ok(Some(event))
            }
            _ => Ok(None),
        }
    }

    /// Consume gateway events until cancelled or the gateway stops.
    pub async fn run(self, mut events: mpsc::Receiver<GatewayEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.handle(event).await {
                        warn!(error = %e, "Dropping member role change");
                        if self.reactor.is_closed() {
                            break;
                        }
                    }
                }
            }
        }
        debug!("Member role feed stopped");
    }
}
