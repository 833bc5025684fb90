//! Service container: wires components together and runs their tasks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use platforms_client::discord::{DiscordOAuth, DiscordRest, GatewayClient, GatewayConfig};
use platforms_client::http;
use platforms_client::twitch::{HelixClient, TwitchOAuth};
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Result;
use crate::api::{ApiServer, AppState};
use crate::config::{AppConfig, NotifyTarget, RoleSyncSettings};
use crate::credentials::{CredentialStatus, CredentialStore};
use crate::links::{IdentityLinkRegistry, LinkingService};
use crate::logging::LoggingConfig;
use crate::monitor::{LiveStatusTracker, TrackerHandle, TwitchStreamStatus};
use crate::notification::{DiscordBotChannel, NotificationChannel, WebhookChannel};
use crate::persist::JsonFile;
use crate::roles::{
    DiscordGuild, MemberRoleFeed, ReconciliationSyncer, RoleChangeHandle, RoleChangeReactor,
    RoleMutationGate,
};
use crate::utils::fs;

/// Default timeout for graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway dispatches buffered ahead of the member-role feed.
const GATEWAY_EVENT_CAPACITY: usize = 256;

pub struct ServiceContainer {
    config: AppConfig,
    http: Client,
    twitch_oauth: Arc<TwitchOAuth>,
    credentials: Arc<CredentialStore>,
    links: Arc<IdentityLinkRegistry>,
    gate: Arc<RoleMutationGate>,
    syncer: Option<Arc<ReconciliationSyncer>>,
    reactor: Option<RoleChangeHandle>,
    tracker: Option<TrackerHandle>,
    logging: Option<Arc<LoggingConfig>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Open persisted state and build the shared components. Nothing is started yet.
    pub async fn new(config: AppConfig) -> Result<Self> {
        fs::ensure_dir_all(&config.data_dir).await?;

        let http = http::default_client();
        let twitch_oauth = Arc::new(TwitchOAuth::new(
            http.clone(),
            &config.twitch.client_id,
            &config.twitch.client_secret,
            &config.twitch.redirect_uri,
        ));

        let credentials = Arc::new(
            CredentialStore::open(JsonFile::open(config.credentials_path()), twitch_oauth.clone())
                .await,
        );
        let links = Arc::new(IdentityLinkRegistry::open(JsonFile::open(config.links_path())).await?);

        Ok(Self {
            config,
            http,
            twitch_oauth,
            credentials,
            links,
            gate: Arc::new(RoleMutationGate::new()),
            syncer: None,
            reactor: None,
            tracker: None,
            logging: None,
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Expose runtime log control through the API.
    pub fn with_logging(mut self, logging: Arc<LoggingConfig>) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Start every subsystem whose configuration is complete.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing services");

        if matches!(self.credentials.status(), CredentialStatus::Missing) {
            warn!(
                "No broadcaster credential yet - open http://{}:{}/auth/twitch/start",
                self.config.api.bind_address, self.config.api.port
            );
        }

        match self.config.role_sync() {
            Ok(settings) => self.start_role_sync(settings).await,
            Err(reason) => info!(reason, "Role sync disabled"),
        }

        match self.config.notify_target() {
            Ok(target) => self.start_live_tracker(target).await,
            Err(reason) => info!(reason, "Live notifications disabled"),
        }

        self.start_api_server();

        info!(tasks = self.tasks.len(), "Services initialized");
        Ok(())
    }

    async fn start_role_sync(&mut self, settings: RoleSyncSettings) {
        let cancel = self.cancellation_token.clone();
        let mapping = Arc::new(settings.mapping);
        let helix = Arc::new(HelixClient::new(self.http.clone(), &self.config.twitch.client_id));
        let rest = DiscordRest::new(self.http.clone(), &settings.bot_token);
        let guild = Arc::new(DiscordGuild::new(rest, &settings.guild_id));

        let reactor = Arc::new(RoleChangeReactor::new(
            &settings.broadcaster_id,
            mapping.clone(),
            self.links.clone(),
            self.credentials.clone(),
            helix.clone(),
            self.gate.clone(),
        ));
        let (handle, reactor_task) = reactor.spawn(cancel.clone());
        self.tasks.push(("role-reactor", reactor_task));

        let feed = MemberRoleFeed::new(&settings.guild_id, handle.clone());
        if let Err(e) = feed.seed(guild.as_ref()).await {
            warn!(error = %e, "Could not seed member roles; early updates will only be cached");
        }
        let (events_tx, events_rx) = mpsc::channel(GATEWAY_EVENT_CAPACITY);
        self.tasks
            .push(("member-feed", tokio::spawn(feed.run(events_rx, cancel.clone()))));

        let gateway = GatewayClient::new(GatewayConfig::new(&settings.bot_token));
        let gateway_cancel = cancel.clone();
        self.tasks.push((
            "discord-gateway",
            tokio::spawn(async move {
                tokio::select! {
                    _ = gateway_cancel.cancelled() => {}
                    _ = gateway.run(events_tx) => {}
                }
            }),
        ));

        let syncer = Arc::new(ReconciliationSyncer::new(
            &settings.broadcaster_id,
            mapping,
            self.links.clone(),
            self.credentials.clone(),
            helix,
            guild,
            self.gate.clone(),
        ));
        self.tasks.push((
            "role-sync",
            tokio::spawn(syncer.clone().run(self.config.sync_interval, cancel)),
        ));

        self.syncer = Some(syncer);
        self.reactor = Some(handle);
        info!(broadcaster_id = %settings.broadcaster_id, "Role sync enabled");
    }

    async fn start_live_tracker(&mut self, target: NotifyTarget) {
        let notifier: Arc<dyn NotificationChannel> = match target {
            NotifyTarget::Bot {
                bot_token,
                channel_id,
            } => Arc::new(DiscordBotChannel::new(
                DiscordRest::new(self.http.clone(), bot_token),
                channel_id,
                self.config.discord.notify_role_id.clone(),
            )),
            NotifyTarget::Webhook { url } => Arc::new(WebhookChannel::new(
                DiscordRest::new(self.http.clone(), String::new()),
                url,
                self.config.discord.notify_role_id.clone(),
            )),
        };

        let status = Arc::new(TwitchStreamStatus::new(
            (*self.twitch_oauth).clone(),
            HelixClient::new(self.http.clone(), &self.config.twitch.client_id),
        ));
        let tracker = LiveStatusTracker::open(
            self.config.channels.clone(),
            status,
            notifier,
            JsonFile::open(self.config.live_state_path()),
        )
        .await;

        let (handle, task) = tracker.spawn(
            self.config.live_poll_interval,
            self.cancellation_token.clone(),
        );
        self.tasks.push(("live-tracker", task));
        self.tracker = Some(handle);
    }

    fn start_api_server(&mut self) {
        let mut state = AppState::new(self.twitch_oauth.clone(), self.credentials.clone());
        if let Some(logging) = &self.logging {
            state = state.with_logging(logging.clone());
        }
        if let Some(oauth) = &self.config.discord.oauth {
            let source = Arc::new(DiscordOAuth::new(
                self.http.clone(),
                &oauth.client_id,
                &oauth.client_secret,
                &oauth.redirect_uri,
            ));
            state = state.with_linking(Arc::new(LinkingService::new(source, self.links.clone())));
        } else {
            info!("Account linking disabled: Discord OAuth is not configured");
        }

        let server = ApiServer::new(
            self.config.api.clone(),
            state,
            self.cancellation_token.clone(),
        );
        let cancel = self.cancellation_token.clone();
        self.tasks.push((
            "api-server",
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!(error = %e, "API server stopped");
                    cancel.cancel();
                }
            }),
        ));
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn links(&self) -> &Arc<IdentityLinkRegistry> {
        &self.links
    }

    pub fn syncer(&self) -> Option<&Arc<ReconciliationSyncer>> {
        self.syncer.as_ref()
    }

    pub fn reactor(&self) -> Option<&RoleChangeHandle> {
        self.reactor.as_ref()
    }

    pub fn tracker(&self) -> Option<&TrackerHandle> {
        self.tracker.as_ref()
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run until Ctrl-C or until a task cancels the token, then shut down.
    pub async fn run_until_shutdown(self) -> Result<()> {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
            },
            _ = self.cancellation_token.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    pub async fn shutdown_with_timeout(self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let drain = async {
            for (name, result) in names.into_iter().zip(join_all(handles).await) {
                if let Err(e) = result {
                    warn!(task = name, error = %e, "Task ended abnormally");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        info!("Services shut down");
        Ok(())
    }
}
