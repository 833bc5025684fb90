//! Reacts to Discord role changes by granting or revoking the mapped Twitch role.

use std::collections::HashSet;
use std::sync::Arc;

use platforms_client::twitch::{ChannelRole, MutationOutcome, RoleAction};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::gate::RoleMutationGate;
use super::mapping::RoleMapping;
use super::platform::PrivilegedRoleApi;
use crate::credentials::CredentialStore;
use crate::links::IdentityLinkRegistry;
use crate::{Error, Result};

/// Pending role-change events before `submit` waits.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// A Discord member's role set before and after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChangeEvent {
    pub discord_user_id: String,
    pub before: HashSet<String>,
    pub after: HashSet<String>,
}

impl RoleChangeEvent {
    pub fn new(
        discord_user_id: impl Into<String>,
        before: impl IntoIterator<Item = String>,
        after: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            discord_user_id: discord_user_id.into(),
            before: before.into_iter().collect(),
            after: after.into_iter().collect(),
        }
    }

    /// `(added, removed)`, each sorted.
    pub fn delta(&self) -> (Vec<&str>, Vec<&str>) {
        let mut added: Vec<&str> = self.after.difference(&self.before).map(String::as_str).collect();
        let mut removed: Vec<&str> = self.before.difference(&self.after).map(String::as_str).collect();
        added.sort_unstable();
        removed.sort_unstable();
        (added, removed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Applied,
    /// Twitch already had the requested state.
    AlreadySatisfied,
    Unlinked,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionItem {
    pub discord_role_id: String,
    pub role: ChannelRole,
    pub action: RoleAction,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionReport {
    pub discord_user_id: String,
    pub items: Vec<ReactionItem>,
}

impl ReactionReport {
    /// No item failed. Unlinked members and redundant mutations count as success.
    pub fn is_success(&self) -> bool {
        !self
            .items
            .iter()
            .any(|i| matches!(i.outcome, ItemOutcome::Failed(_)))
    }
}

pub struct RoleChangeReactor {
    broadcaster_id: String,
    mapping: Arc<RoleMapping>,
    links: Arc<IdentityLinkRegistry>,
    credentials: Arc<CredentialStore>,
    twitch: Arc<dyn PrivilegedRoleApi>,
    gate: Arc<RoleMutationGate>,
}

impl RoleChangeReactor {
    pub fn new(
        broadcaster_id: impl Into<String>,
        mapping: Arc<RoleMapping>,
        links: Arc<IdentityLinkRegistry>,
        credentials: Arc<CredentialStore>,
        twitch: Arc<dyn PrivilegedRoleApi>,
        gate: Arc<RoleMutationGate>,
    ) -> Self {
        Self {
            broadcaster_id: broadcaster_id.into(),
            mapping,
            links,
            credentials,
            twitch,
            gate,
        }
    }

    /// Apply one role-change event. Never fails as a whole; each mapped role gets its own outcome.
    #[instrument(skip(self, event), fields(discord_user_id = %event.discord_user_id))]
    pub async fn handle(&self, event: &RoleChangeEvent) -> ReactionReport {
        let mut report = ReactionReport {
            discord_user_id: event.discord_user_id.clone(),
            items: Vec::new(),
        };

        let (added, removed) = event.delta();
        let changes: Vec<(&str, ChannelRole, RoleAction)> = added
            .into_iter()
            .map(|id| (id, RoleAction::Grant))
            .chain(removed.into_iter().map(|id| (id, RoleAction::Revoke)))
            .filter_map(|(id, action)| self.mapping.get(id).map(|role| (id, role, action)))
            .collect();

        if changes.is_empty() {
            debug!("No mapped role changed");
            return report;
        }

        let twitch_user_id = self
            .links
            .by_discord_id(&event.discord_user_id)
            .and_then(|link| link.twitch_id().map(str::to_string));
        let Some(twitch_user_id) = twitch_user_id else {
            let err = Error::unlinked(&event.discord_user_id);
            info!(error = %err, "Skipping mapped role change");
            report.items = changes
                .into_iter()
                .map(|(id, role, action)| item(id, role, action, ItemOutcome::Unlinked))
                .collect();
            return report;
        };

        let token = match self.credentials.get_valid_access_token().await {
            Ok(token) => token,
            Err(e) => {
                let err = Error::from(e);
                error!(error = %err, "Cannot mutate Twitch roles without a broadcaster credential");
                report.items = changes
                    .into_iter()
                    .map(|(id, role, action)| {
                        item(id, role, action, ItemOutcome::Failed(err.to_string()))
                    })
                    .collect();
                return report;
            }
        };

        for (role_id, role, action) in changes {
            let outcome = match self.apply(&token, &twitch_user_id, role, action).await {
                Ok(MutationOutcome::Applied) => {
                    info!(twitch_user_id = %twitch_user_id, %role, %action, "Twitch role updated");
                    ItemOutcome::Applied
                }
                Ok(MutationOutcome::AlreadySatisfied) => {
                    debug!(twitch_user_id = %twitch_user_id, %role, %action, "Twitch role already correct");
                    ItemOutcome::AlreadySatisfied
                }
                Err(e) => {
                    warn!(twitch_user_id = %twitch_user_id, %role, %action, error = %e, "Twitch role update failed");
                    ItemOutcome::Failed(e.to_string())
                }
            };
            report.items.push(item(role_id, role, action, outcome));
        }

        report
    }

    async fn apply(
        &self,
        token: &str,
        twitch_user_id: &str,
        role: ChannelRole,
        action: RoleAction,
    ) -> Result<MutationOutcome> {
        let _guard = self.gate.acquire(&self.broadcaster_id).await;
        let outcome = match action {
            RoleAction::Grant => {
                self.twitch
                    .grant(token, &self.broadcaster_id, role, twitch_user_id)
                    .await?
            }
            RoleAction::Revoke => {
                self.twitch
                    .revoke(token, &self.broadcaster_id, role, twitch_user_id)
                    .await?
            }
        };
        Ok(outcome)
    }

    /// Start the worker that applies submitted events one at a time, in order.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> (RoleChangeHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(rx, cancel));
        (RoleChangeHandle { tx }, task)
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RoleChangeEvent>, cancel: CancellationToken) {
        info!(broadcaster_id = %self.broadcaster_id, "Role change reactor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let report = self.handle(&event).await;
                    if !report.is_success() {
                        warn!(
                            discord_user_id = %report.discord_user_id,
                            failed = report.items.iter().filter(|i| matches!(i.outcome, ItemOutcome::Failed(_))).count(),
                            "Role change partially applied; the next sync pass will correct it"
                        );
                    }
                }
            }
        }
        info!("Role change reactor stopped");
    }
}

fn item(role_id: &str, role: ChannelRole, action: RoleAction, outcome: ItemOutcome) -> ReactionItem {
    ReactionItem {
        discord_role_id: role_id.to_string(),
        role,
        action,
        outcome,
    }
}

/// Sending side of the reactor's queue.
#[derive(Clone)]
pub struct RoleChangeHandle {
    tx: mpsc::Sender<RoleChangeEvent>,
}

impl RoleChangeHandle {
    /// Queue an event, waiting while the queue is full.
    pub async fn submit(&self, event: RoleChangeEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::Other("role change reactor has stopped".into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
