//! Periodic reconciliation of Discord roles against the Twitch VIP and moderator lists.
//!
//! Twitch is authoritative. Each pass reads both complete role lists and one
//! snapshot of the guild, then adds or removes mapped Discord roles on linked
//! members until they match.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use platforms_client::discord::GuildMember;
use platforms_client::twitch::{ChannelRole, RoleMember};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::gate::RoleMutationGate;
use super::mapping::{RoleMapping, sync_reason};
use super::platform::{GuildApi, PrivilegedRoleApi, list_all};
use crate::Result;
use crate::credentials::CredentialStore;
use crate::links::{IdentityLink, IdentityLinkRegistry};

/// Holders of one Twitch role, by user id and by lowercased login.
#[derive(Debug, Default)]
struct Roster {
    ids: HashSet<String>,
    logins: HashSet<String>,
}

impl Roster {
    fn from_members(members: &[RoleMember]) -> Self {
        Self {
            ids: members.iter().map(|m| m.user_id.clone()).collect(),
            logins: members
                .iter()
                .map(|m| m.user_login.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Prefer the user id; links without one fall back to the login.
    fn contains(&self, link: &IdentityLink) -> bool {
        match link.twitch_id() {
            Some(id) => self.ids.contains(id),
            None => self.logins.contains(&link.twitch_login.to_ascii_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFailure {
    pub discord_user_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub vips: usize,
    pub moderators: usize,
    pub members_checked: usize,
    pub unlinked: usize,
    pub roles_added: usize,
    pub roles_removed: usize,
    pub failures: Vec<MemberFailure>,
    pub duration: Duration,
}

impl SyncReport {
    pub fn corrections(&self) -> usize {
        self.roles_added + self.roles_removed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was still running.
    Skipped,
    Completed(SyncReport),
}

/// Clears the running flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReconciliationSyncer {
    broadcaster_id: String,
    mapping: Arc<RoleMapping>,
    links: Arc<IdentityLinkRegistry>,
    credentials: Arc<CredentialStore>,
    twitch: Arc<dyn PrivilegedRoleApi>,
    guild: Arc<dyn GuildApi>,
    gate: Arc<RoleMutationGate>,
    running: AtomicBool,
}

impl ReconciliationSyncer {
    pub fn new(
        broadcaster_id: impl Into<String>,
        mapping: Arc<RoleMapping>,
        links: Arc<IdentityLinkRegistry>,
        credentials: Arc<CredentialStore>,
        twitch: Arc<dyn PrivilegedRoleApi>,
        guild: Arc<dyn GuildApi>,
        gate: Arc<RoleMutationGate>,
    ) -> Self {
        Self {
            broadcaster_id: broadcaster_id.into(),
            mapping,
            links,
            credentials,
            twitch,
            guild,
            gate,
            running: AtomicBool::new(false),
        }
    }

    /// Run one pass now unless one is already in flight.
    ///
    /// Errors are limited to conditions that make the whole pass meaningless:
    /// no credential, an incomplete Twitch list, or no guild snapshot.
    pub async fn run_once(&self) -> Result<PassOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync pass already running; skipping");
            return Ok(PassOutcome::Skipped);
        }
        let _guard = PassGuard(&self.running);
        self.pass().await.map(PassOutcome::Completed)
    }

    #[instrument(skip(self), fields(broadcaster_id = %self.broadcaster_id))]
    async fn pass(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let token = self.credentials.get_valid_access_token().await?;

        let (vips, moderators) = tokio::try_join!(
            list_all(self.twitch.as_ref(), &token, &self.broadcaster_id, ChannelRole::Vip),
            list_all(self.twitch.as_ref(), &token, &self.broadcaster_id, ChannelRole::Moderator),
        )?;
        let vip_roster = Roster::from_members(&vips);
        let mod_roster = Roster::from_members(&moderators);

        let members = self.guild.members().await?;

        let mut report = SyncReport {
            vips: vips.len(),
            moderators: moderators.len(),
            ..SyncReport::default()
        };

        for member in &members {
            if member.is_bot() {
                continue;
            }
            let Some(user_id) = member.user_id() else {
                continue;
            };
            let Some(link) = self.links.by_discord_id(user_id) else {
                report.unlinked += 1;
                continue;
            };
            report.members_checked += 1;

            let holds = |role: ChannelRole| match role {
                ChannelRole::Vip => vip_roster.contains(&link),
                ChannelRole::Moderator => mod_roster.contains(&link),
            };
            self.reconcile_member(user_id, member, &link, holds, &mut report)
                .await;
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    async fn reconcile_member(
        &self,
        user_id: &str,
        member: &GuildMember,
        link: &IdentityLink,
        holds: impl Fn(ChannelRole) -> bool,
        report: &mut SyncReport,
    ) {
        for (role_id, role) in self.mapping.iter() {
            let has = member.roles.iter().any(|r| r == role_id);
            let want = holds(role);
            if has == want {
                continue;
            }

            let reason = sync_reason(role);
            let result = {
                let _guard = self.gate.acquire(&self.broadcaster_id).await;
                if want {
                    self.guild.add_role(user_id, role_id, reason).await
                } else {
                    self.guild.remove_role(user_id, role_id, reason).await
                }
            };

            match result {
                Ok(()) if want => {
                    report.roles_added += 1;
                    info!(discord_user_id = %user_id, twitch_login = %link.twitch_login, %role, role_id, "Added Discord role");
                }
                Ok(()) => {
                    report.roles_removed += 1;
                    info!(discord_user_id = %user_id, twitch_login = %link.twitch_login, %role, role_id, "Removed Discord role");
                }
                Err(e) => {
                    warn!(discord_user_id = %user_id, %role, role_id, error = %e, "Discord role correction failed");
                    report.failures.push(MemberFailure {
                        discord_user_id: user_id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Run passes every `period` until cancelled. Ticks that fire during a pass are dropped.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            broadcaster_id = %self.broadcaster_id,
            period_secs = period.as_secs(),
            mapped_roles = self.mapping.len(),
            "Role sync started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(PassOutcome::Completed(report)) => info!(
                            vips = report.vips,
                            moderators = report.moderators,
                            checked = report.members_checked,
                            unlinked = report.unlinked,
                            added = report.roles_added,
                            removed = report.roles_removed,
                            failures = report.failures.len(),
                            duration_ms = report.duration.as_millis() as u64,
                            "Role sync pass finished"
                        ),
                        Ok(PassOutcome::Skipped) => debug!("Role sync tick skipped"),
                        Err(e) if e.is_credential_terminal() => {
                            error!(error = %e, "Role sync halted - re-authorize the broadcaster")
                        }
                        Err(e) => warn!(error = %e, "Role sync pass aborted"),
                    }
                }
            }
        }
        info!("Role sync stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::testing::{self, FakeGuild, FakeTwitch};
    use platforms_client::twitch::{MutationOutcome, Page, Pagination};
    use std::sync::atomic::Ordering;

    struct Fixture {
        _dir: tempfile::TempDir,
        twitch: Arc<FakeTwitch>,
        guild: Arc<FakeGuild>,
        syncer: Arc<ReconciliationSyncer>,
    }

    async fn fixture(page_size: usize, links: &[(&str, &str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let twitch = FakeTwitch::new(page_size);
        let guild = FakeGuild::new();
        let mapping = RoleMapping::new([
            ("900".to_string(), ChannelRole::Vip),
            ("901".to_string(), ChannelRole::Moderator),
        ]);
        let syncer = Arc::new(ReconciliationSyncer::new(
            "b1",
            Arc::new(mapping),
            testing::registry_with(&dir, links).await,
            testing::valid_credentials(&dir),
            twitch.clone(),
            guild.clone(),
            Arc::new(RoleMutationGate::new()),
        ));
        Fixture {
            _dir: dir,
            twitch,
            guild,
            syncer,
        }
    }

    fn completed(outcome: PassOutcome) -> SyncReport {
        match outcome {
            PassOutcome::Completed(report) => report,
            PassOutcome::Skipped => panic!("pass was skipped"),
        }
    }

    #[tokio::test]
    async fn test_pass_converges_linked_members() {
        let f = fixture(100, &[("1", "t1", "a"), ("2", "t2", "b"), ("3", "t3", "c")]).await;
        f.twitch.with_holder(ChannelRole::Vip, "t1", "a");
        f.twitch.with_holder(ChannelRole::Vip, "t3", "c");
        f.twitch.with_holder(ChannelRole::Moderator, "t2", "b");

        f.guild.with_member("1", &["555"]);
        f.guild.with_member("2", &["900", "555"]);
        f.guild.with_member("3", &["900"]);
        f.guild.with_member("4", &[]);

        let report = completed(f.syncer.run_once().await.unwrap());

        assert_eq!(f.guild.roles_of("1"), vec!["555", "900"]);
        assert_eq!(f.guild.roles_of("2"), vec!["555", "901"]);
        assert_eq!(f.guild.roles_of("3"), vec!["900"]);
        assert!(f.guild.roles_of("4").is_empty());

        assert_eq!(report.members_checked, 3);
        assert_eq!(report.unlinked, 1);
        assert_eq!(report.roles_added, 2);
        assert_eq!(report.roles_removed, 1);
        assert!(report.failures.is_empty());
        assert!(f.twitch.mutations().is_empty());

        let reasons: HashSet<String> = f.guild.changes().into_iter().map(|c| c.reason).collect();
        assert!(reasons.contains("Twitch VIP sync"));
        assert!(reasons.contains("Twitch Mod sync"));

        // Already converged.
        let again = completed(f.syncer.run_once().await.unwrap());
        assert_eq!(again.corrections(), 0);
    }

    #[tokio::test]
    async fn test_all_pages_are_read() {
        let f = fixture(2, &[("1", "t1", "a"), ("5", "t5", "e")]).await;
        for i in 1..=5 {
            f.twitch
                .with_holder(ChannelRole::Vip, &format!("t{i}"), &format!("u{i}"));
        }
        f.guild.with_member("1", &[]);
        f.guild.with_member("5", &[]);

        let report = completed(f.syncer.run_once().await.unwrap());
        assert_eq!(report.vips, 5);
        assert_eq!(f.guild.roles_of("5"), vec!["900"]);
        // 3 VIP pages + 1 moderator page.
        assert_eq!(f.twitch.pages_served.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_login_fallback_for_links_without_id() {
        let f = fixture(100, &[("1", "", "MixedCase")]).await;
        f.twitch.with_holder(ChannelRole::Vip, "t1", "mixedcase");
        f.guild.with_member("1", &[]);

        completed(f.syncer.run_once().await.unwrap());
        assert_eq!(f.guild.roles_of("1"), vec!["900"]);
    }

    #[tokio::test]
    async fn test_member_failure_does_not_abort_pass() {
        let f = fixture(100, &[("1", "t1", "a"), ("2", "t2", "b")]).await;
        f.twitch.with_holder(ChannelRole::Vip, "t1", "a");
        f.twitch.with_holder(ChannelRole::Vip, "t2", "b");
        f.guild.with_member("1", &[]);
        f.guild.with_member("2", &[]);
        f.guild.failing_users.lock().insert("1".into());

        let report = completed(f.syncer.run_once().await.unwrap());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].discord_user_id, "1");
        assert_eq!(f.guild.roles_of("2"), vec!["900"]);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let f = fixture(100, &[]).await;
        *f.guild.fetch_delay.lock() = Duration::from_millis(200);

        let first = {
            let syncer = f.syncer.clone();
            tokio::spawn(async move { syncer.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.syncer.run_once().await.unwrap(), PassOutcome::Skipped);
        assert!(matches!(
            first.await.unwrap().unwrap(),
            PassOutcome::Completed(_)
        ));
        assert_eq!(f.guild.member_fetches.load(Ordering::SeqCst), 1);

        // The flag is released once the pass ends.
        *f.guild.fetch_delay.lock() = Duration::ZERO;
        assert!(matches!(
            f.syncer.run_once().await.unwrap(),
            PassOutcome::Completed(_)
        ));
    }

    /// Serves `t0`, `t1`, ... one per page, always pointing back at cursor `c1`.
    struct LoopingCursor;

    #[async_trait::async_trait]
    impl PrivilegedRoleApi for LoopingCursor {
        async fn list_page(
            &self,
            _token: &str,
            _broadcaster_id: &str,
            role: ChannelRole,
            after: Option<&str>,
        ) -> platforms_client::Result<Page<RoleMember>> {
            let data = match (role, after) {
                (ChannelRole::Moderator, _) => Vec::new(),
                (ChannelRole::Vip, None) => vec![member("t0")],
                (ChannelRole::Vip, Some(_)) => vec![member("t1")],
            };
            let cursor = (role == ChannelRole::Vip).then(|| "c1".to_string());
            Ok(Page {
                data,
                pagination: Some(Pagination { cursor }),
            })
        }

        async fn grant(
            &self,
            _token: &str,
            _broadcaster_id: &str,
            _role: ChannelRole,
            _user_id: &str,
        ) -> platforms_client::Result<MutationOutcome> {
            Ok(MutationOutcome::Applied)
        }

        async fn revoke(
            &self,
            _token: &str,
            _broadcaster_id: &str,
            _role: ChannelRole,
            _user_id: &str,
        ) -> platforms_client::Result<MutationOutcome> {
            Ok(MutationOutcome::Applied)
        }
    }

    fn member(id: &str) -> RoleMember {
        RoleMember {
            user_id: id.into(),
            user_login: id.into(),
            user_name: id.into(),
        }
    }

    #[tokio::test]
    async fn test_incomplete_role_list_aborts_pass() {
        let dir = tempfile::tempdir().unwrap();
        let guild = FakeGuild::new();
        guild.with_member("1", &["900"]);
        guild.with_member("2", &["900"]);
        let syncer = ReconciliationSyncer::new(
            "b1",
            Arc::new(RoleMapping::new([("900".to_string(), ChannelRole::Vip)])),
            testing::registry_with(&dir, &[("1", "t0", "t0"), ("2", "t2", "t2")]).await,
            testing::valid_credentials(&dir),
            Arc::new(LoopingCursor),
            guild.clone(),
            Arc::new(RoleMutationGate::new()),
        );

        let err = syncer.run_once().await.unwrap_err();
        assert!(err.to_string().contains("repeated pagination cursor"));
        assert_eq!(guild.member_fetches.load(Ordering::SeqCst), 0);
        assert!(guild.changes().is_empty());
        assert_eq!(guild.roles_of("2"), vec!["900"]);
    }

    #[tokio::test]
    async fn test_missing_credential_aborts_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let twitch = FakeTwitch::new(100);
        let guild = FakeGuild::new();
        let syncer = ReconciliationSyncer::new(
            "b1",
            Arc::new(RoleMapping::new([("900".to_string(), ChannelRole::Vip)])),
            testing::registry_with(&dir, &[]).await,
            testing::missing_credentials(&dir),
            twitch.clone(),
            guild.clone(),
            Arc::new(RoleMutationGate::new()),
        );

        let err = syncer.run_once().await.unwrap_err();
        assert!(err.is_credential_terminal());
        assert_eq!(twitch.pages_served.load(Ordering::SeqCst), 0);
        assert_eq!(guild.member_fetches.load(Ordering::SeqCst), 0);
        // The failed pass released the guard.
        assert!(syncer.run_once().await.is_err());
    }
}
