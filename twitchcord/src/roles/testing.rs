//! In-memory platform fakes shared by the role tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use platforms_client::PlatformError;
use platforms_client::discord::{GuildMember, User};
use platforms_client::twitch::{
    ChannelRole, MutationOutcome, Page, Pagination, RoleAction, RoleMember, TokenResponse,
    classify_mutation_error,
};

use super::platform::{GuildApi, PrivilegedRoleApi};
use crate::credentials::{CredentialRecord, CredentialStore, TokenGrants};
use crate::links::{IdentityLink, IdentityLinkRegistry};
use crate::persist::JsonFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub action: RoleAction,
    pub role: ChannelRole,
    pub user_id: String,
}

/// Twitch role lists with Helix-like redundant-mutation errors.
pub struct FakeTwitch {
    holders: Mutex<BTreeMap<ChannelRole, Vec<RoleMember>>>,
    page_size: usize,
    pub pages_served: AtomicUsize,
    pub mutations: Mutex<Vec<Mutation>>,
    pub failing_users: Mutex<HashSet<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeTwitch {
    pub fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            holders: Mutex::new(BTreeMap::new()),
            page_size,
            pages_served: AtomicUsize::new(0),
            mutations: Mutex::new(Vec::new()),
            failing_users: Mutex::new(HashSet::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn with_holder(&self, role: ChannelRole, user_id: &str, login: &str) {
        self.holders.lock().entry(role).or_default().push(RoleMember {
            user_id: user_id.into(),
            user_login: login.into(),
            user_name: login.into(),
        });
    }

    pub fn holds(&self, role: ChannelRole, user_id: &str) -> bool {
        self.holders
            .lock()
            .get(&role)
            .is_some_and(|list| list.iter().any(|m| m.user_id == user_id))
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().clone()
    }

    async fn mutate(
        &self,
        action: RoleAction,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.mutations.lock().push(Mutation {
            action,
            role,
            user_id: user_id.into(),
        });
        if self.failing_users.lock().contains(user_id) {
            return Err(PlatformError::api(500, "internal error"));
        }

        let mut holders = self.holders.lock();
        let list = holders.entry(role).or_default();
        let present = list.iter().any(|m| m.user_id == user_id);
        match (action, present) {
            (RoleAction::Grant, false) => {
                list.push(RoleMember {
                    user_id: user_id.into(),
                    user_login: format!("login{user_id}"),
                    user_name: String::new(),
                });
                Ok(MutationOutcome::Applied)
            }
            (RoleAction::Revoke, true) => {
                list.retain(|m| m.user_id != user_id);
                Ok(MutationOutcome::Applied)
            }
            (RoleAction::Grant, true) => classify_mutation_error(
                action,
                PlatformError::api(422, r#"{"message":"The user is already a VIP."}"#),
            ),
            (RoleAction::Revoke, false) => classify_mutation_error(
                action,
                PlatformError::api(422, r#"{"message":"The user is not a VIP."}"#),
            ),
        }
    }
}

#[async_trait]
impl PrivilegedRoleApi for FakeTwitch {
    async fn list_page(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        role: ChannelRole,
        after: Option<&str>,
    ) -> platforms_client::Result<Page<RoleMember>> {
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        let all = self.holders.lock().get(&role).cloned().unwrap_or_default();
        let start: usize = after.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(all.len());
        let cursor = (end < all.len()).then(|| end.to_string());
        Ok(Page {
            data: all[start..end].to_vec(),
            pagination: Some(Pagination { cursor }),
        })
    }

    async fn grant(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        self.mutate(RoleAction::Grant, role, user_id).await
    }

    async fn revoke(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        self.mutate(RoleAction::Revoke, role, user_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildChange {
    pub added: bool,
    pub user_id: String,
    pub role_id: String,
    pub reason: String,
}

pub struct FakeGuild {
    members: Mutex<BTreeMap<String, Vec<String>>>,
    pub member_fetches: AtomicUsize,
    pub changes: Mutex<Vec<GuildChange>>,
    pub failing_users: Mutex<HashSet<String>>,
    /// Delay inside `members()`, used to hold a pass open.
    pub fetch_delay: Mutex<Duration>,
}

impl FakeGuild {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            members: Mutex::new(BTreeMap::new()),
            member_fetches: AtomicUsize::new(0),
            changes: Mutex::new(Vec::new()),
            failing_users: Mutex::new(HashSet::new()),
            fetch_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn with_member(&self, user_id: &str, roles: &[&str]) {
        self.members
            .lock()
            .insert(user_id.into(), roles.iter().map(|r| r.to_string()).collect());
    }

    pub fn roles_of(&self, user_id: &str) -> Vec<String> {
        let mut roles = self.members.lock().get(user_id).cloned().unwrap_or_default();
        roles.sort();
        roles
    }

    pub fn changes(&self) -> Vec<GuildChange> {
        self.changes.lock().clone()
    }

    fn record(&self, added: bool, user_id: &str, role_id: &str, reason: &str) -> crate::Result<()> {
        if self.failing_users.lock().contains(user_id) {
            return Err(crate::Error::Api {
                status: 403,
                body: "Missing Permissions".into(),
            });
        }
        self.changes.lock().push(GuildChange {
            added,
            user_id: user_id.into(),
            role_id: role_id.into(),
            reason: reason.into(),
        });
        let mut members = self.members.lock();
        let roles = members.entry(user_id.into()).or_default();
        if added {
            roles.push(role_id.into());
        } else {
            roles.retain(|r| r != role_id);
        }
        Ok(())
    }
}

#[async_trait]
impl GuildApi for FakeGuild {
    async fn members(&self) -> crate::Result<Vec<GuildMember>> {
        self.member_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .members
            .lock()
            .iter()
            .map(|(id, roles)| GuildMember {
                user: Some(User {
                    id: id.clone(),
                    username: format!("user{id}"),
                    bot: false,
                }),
                roles: roles.clone(),
            })
            .collect())
    }

    async fn add_role(&self, user_id: &str, role_id: &str, reason: &str) -> crate::Result<()> {
        self.record(true, user_id, role_id, reason)
    }

    async fn remove_role(&self, user_id: &str, role_id: &str, reason: &str) -> crate::Result<()> {
        self.record(false, user_id, role_id, reason)
    }
}

struct NoRefresh;

#[async_trait]
impl TokenGrants for NoRefresh {
    async fn refresh(&self, _refresh_token: &str) -> platforms_client::Result<TokenResponse> {
        Err(PlatformError::api(400, "refresh not expected in this test"))
    }
}

/// A store holding a token valid for hours.
pub fn valid_credentials(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
    let now = Utc::now();
    let record = CredentialRecord {
        access_token: "broadcaster-token".into(),
        refresh_token: Some("refresh".into()),
        expires_at: now + TimeDelta::hours(4),
        scope: vec![],
        obtained_at: now,
    };
    Arc::new(CredentialStore::new(
        JsonFile::open(dir.path().join("tokens.json")),
        Arc::new(NoRefresh),
        Some(record),
    ))
}

/// A store with nothing in it.
pub fn missing_credentials(dir: &tempfile::TempDir) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(
        JsonFile::open(dir.path().join("tokens.json")),
        Arc::new(NoRefresh),
        None,
    ))
}

pub async fn registry_with(
    dir: &tempfile::TempDir,
    links: &[(&str, &str, &str)],
) -> Arc<IdentityLinkRegistry> {
    let registry = IdentityLinkRegistry::open(JsonFile::open(dir.path().join("links.json")))
        .await
        .unwrap();
    for (discord, twitch, login) in links {
        registry
            .upsert(IdentityLink::new(*discord, *twitch, *login))
            .await
            .unwrap();
    }
    Arc::new(registry)
}
