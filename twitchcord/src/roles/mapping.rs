use std::collections::BTreeMap;

use platforms_client::twitch::ChannelRole;

use crate::{Error, Result};

/// Discord role id to Twitch channel role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    roles: BTreeMap<String, ChannelRole>,
}

impl RoleMapping {
    pub fn new(roles: impl IntoIterator<Item = (String, ChannelRole)>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    /// Parse `roleId:vip,roleId:moderator`. `mod` is accepted for moderator.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut roles = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (role_id, kind) = entry
                .split_once(':')
                .ok_or_else(|| Error::config(format!("role mapping entry `{entry}` is not `roleId:kind`")))?;
            let role_id = role_id.trim();
            if role_id.is_empty() || !role_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::config(format!(
                    "role mapping entry `{entry}` has an invalid Discord role id"
                )));
            }
            let kind: ChannelRole = kind.parse().map_err(Error::Configuration)?;
            if roles.insert(role_id.to_string(), kind).is_some() {
                return Err(Error::config(format!("Discord role {role_id} is mapped twice")));
            }
        }
        Ok(Self { roles })
    }

    pub fn get(&self, discord_role_id: &str) -> Option<ChannelRole> {
        self.roles.get(discord_role_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChannelRole)> {
        self.roles.iter().map(|(id, role)| (id.as_str(), *role))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Audit-log reason attached to Discord role changes made by the syncer.
pub fn sync_reason(role: ChannelRole) -> &'static str {
    match role {
        ChannelRole::Vip => "Twitch VIP sync",
        ChannelRole::Moderator => "Twitch Mod sync",
    }
}
