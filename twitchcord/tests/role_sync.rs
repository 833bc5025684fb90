//! Linking, reacting and reconciling against in-memory platforms.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use platforms_client::PlatformError;
use platforms_client::discord::{Connection, GuildMember, User};
use platforms_client::twitch::{
    ChannelRole, MutationOutcome, Page, Pagination, RoleMember, TokenResponse,
};
use tokio_util::sync::CancellationToken;
use twitchcord::credentials::{CredentialRecord, CredentialStore, TokenGrants};
use twitchcord::links::{ConnectionSource, IdentityLinkRegistry, LinkOutcome, LinkingService};
use twitchcord::persist::JsonFile;
use twitchcord::roles::{
    GuildApi, ItemOutcome, PassOutcome, PrivilegedRoleApi, ReconciliationSyncer,
    RoleChangeEvent, RoleChangeReactor, RoleMapping, RoleMutationGate,
};
use url::Url;

const BROADCASTER: &str = "999";
const VIP_ROLE: &str = "111";

struct Grants;

#[async_trait]
impl TokenGrants for Grants {
    async fn refresh(&self, _refresh_token: &str) -> platforms_client::Result<TokenResponse> {
        Err(PlatformError::api(400, "Invalid refresh token"))
    }
}

struct Source;

#[async_trait]
impl ConnectionSource for Source {
    fn authorize_url(&self, _state: Option<&str>) -> twitchcord::Result<Url> {
        Ok(Url::parse("https://discord.com/oauth2/authorize").unwrap())
    }

    async fn user_connections(&self, code: &str) -> twitchcord::Result<(User, Vec<Connection>)> {
        let user = User {
            id: "100".into(),
            username: "viewer".into(),
            bot: false,
        };
        let connections = match code {
            "with-twitch" => vec![Connection {
                kind: "twitch".into(),
                id: "55".into(),
                name: "ViewerLogin".into(),
                verified: true,
            }],
            _ => Vec::new(),
        };
        Ok((user, connections))
    }
}

#[derive(Default)]
struct Twitch {
    vips: Mutex<BTreeSet<String>>,
}

#[async_trait]
impl PrivilegedRoleApi for Twitch {
    async fn list_page(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        role: ChannelRole,
        _after: Option<&str>,
    ) -> platforms_client::Result<Page<RoleMember>> {
        let data = match role {
            ChannelRole::Vip => self
                .vips
                .lock()
                .iter()
                .map(|id| RoleMember {
                    user_id: id.clone(),
                    user_login: format!("login{id}"),
                    user_name: String::new(),
                })
                .collect(),
            ChannelRole::Moderator => Vec::new(),
        };
        Ok(Page {
            data,
            pagination: Some(Pagination { cursor: None }),
        })
    }

    async fn grant(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        _role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        if self.vips.lock().insert(user_id.to_string()) {
            Ok(MutationOutcome::Applied)
        } else {
            Ok(MutationOutcome::AlreadySatisfied)
        }
    }

    async fn revoke(
        &self,
        _token: &str,
        _broadcaster_id: &str,
        _role: ChannelRole,
        user_id: &str,
    ) -> platforms_client::Result<MutationOutcome> {
        if self.vips.lock().remove(user_id) {
            Ok(MutationOutcome::Applied)
        } else {
            Ok(MutationOutcome::AlreadySatisfied)
        }
    }
}

#[derive(Default)]
struct Guild {
    members: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl Guild {
    fn roles_of(&self, user_id: &str) -> BTreeSet<String> {
        self.members.lock().get(user_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GuildApi for Guild {
    async fn members(&self) -> twitchcord::Result<Vec<GuildMember>> {
        Ok(self
            .members
            .lock()
            .iter()
            .map(|(id, roles)| GuildMember {
                user: Some(User {
                    id: id.clone(),
                    username: String::new(),
                    bot: false,
                }),
                roles: roles.iter().cloned().collect(),
            })
            .collect())
    }

    async fn add_role(&self, user_id: &str, role_id: &str, _reason: &str) -> twitchcord::Result<()> {
        self.members
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .insert(role_id.to_string());
        Ok(())
    }

    async fn remove_role(&self, user_id: &str, role_id: &str, _reason: &str) -> twitchcord::Result<()> {
        if let Some(roles) = self.members.lock().get_mut(user_id) {
            roles.remove(role_id);
        }
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    links: Arc<IdentityLinkRegistry>,
    linking: LinkingService,
    reactor: Arc<RoleChangeReactor>,
    syncer: ReconciliationSyncer,
    twitch: Arc<Twitch>,
    guild: Arc<Guild>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let record = CredentialRecord::from_token_response(
        TokenResponse {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_in: 3600,
            scope: vec!["channel:manage:vips".into()],
            token_type: Some("bearer".into()),
        },
        Utc::now(),
    );
    let credentials = Arc::new(CredentialStore::new(
        JsonFile::open(dir.path().join("tokens.json")),
        Arc::new(Grants),
        Some(record),
    ));
    let links = Arc::new(
        IdentityLinkRegistry::open(JsonFile::open(dir.path().join("links.json")))
            .await
            .unwrap(),
    );
    let linking = LinkingService::new(Arc::new(Source), links.clone());

    let mapping = Arc::new(RoleMapping::parse(&format!("{VIP_ROLE}:vip")).unwrap());
    let gate = Arc::new(RoleMutationGate::new());
    let twitch = Arc::new(Twitch::default());
    let guild = Arc::new(Guild::default());

    let reactor = Arc::new(RoleChangeReactor::new(
        BROADCASTER,
        mapping.clone(),
        links.clone(),
        credentials.clone(),
        twitch.clone(),
        gate.clone(),
    ));
    let syncer = ReconciliationSyncer::new(
        BROADCASTER,
        mapping,
        links.clone(),
        credentials,
        twitch.clone(),
        guild.clone(),
        gate,
    );

    Harness {
        _dir: dir,
        links,
        linking,
        reactor,
        syncer,
        twitch,
        guild,
    }
}

fn gained_vip() -> RoleChangeEvent {
    RoleChangeEvent::new("100", Vec::<String>::new(), vec![VIP_ROLE.to_string()])
}

#[tokio::test]
async fn unlinked_member_is_not_granted_until_linked() {
    let h = harness().await;

    let report = h.reactor.handle(&gained_vip()).await;
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].outcome, ItemOutcome::Unlinked);
    assert!(h.twitch.vips.lock().is_empty());

    let outcome = h.linking.complete("no-twitch").await.unwrap();
    assert!(matches!(outcome, LinkOutcome::NoTwitchConnection { .. }));
    assert!(h.links.is_empty());

    let outcome = h.linking.complete("with-twitch").await.unwrap();
    let LinkOutcome::Linked { link, .. } = outcome else {
        panic!("expected a link, got {outcome:?}");
    };
    assert_eq!(link.twitch_login, "viewerlogin");

    let report = h.reactor.handle(&gained_vip()).await;
    assert!(report.is_success());
    assert_eq!(report.items[0].outcome, ItemOutcome::Applied);
    assert!(h.twitch.vips.lock().contains("55"));
}

#[tokio::test]
async fn reactor_and_syncer_converge() {
    let h = harness().await;
    h.linking.complete("with-twitch").await.unwrap();
    h.guild
        .members
        .lock()
        .insert("100".into(), BTreeSet::from([VIP_ROLE.to_string()]));

    // Delivered twice, as after a gateway reconnect.
    let (handle, task) = h.reactor.clone().spawn(CancellationToken::new());
    handle.submit(gained_vip()).await.unwrap();
    handle.submit(gained_vip()).await.unwrap();
    drop(handle);
    task.await.unwrap();
    assert_eq!(h.twitch.vips.lock().len(), 1);

    let PassOutcome::Completed(report) = h.syncer.run_once().await.unwrap() else {
        panic!("pass skipped");
    };
    assert_eq!(report.vips, 1);
    assert_eq!(report.members_checked, 1);
    assert_eq!(report.corrections(), 0);

    // VIP removed on Twitch directly; the next pass drops the Discord role.
    h.twitch.vips.lock().clear();
    let PassOutcome::Completed(report) = h.syncer.run_once().await.unwrap() else {
        panic!("pass skipped");
    };
    assert_eq!(report.roles_removed, 1);
    assert!(h.guild.roles_of("100").is_empty());
}
