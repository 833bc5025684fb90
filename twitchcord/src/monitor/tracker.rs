//! Polls watched Twitch channels and announces when they go live.
//!
//! The tracker owns its live states and its app token. Everything runs on the
//! tracker's own task; other tasks reach it only through [`TrackerHandle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::app_token::AppTokenCache;
use super::state::{LiveState, LiveStateMap, Transition};
use super::status::StreamStatusApi;
use crate::notification::{LiveNotice, NotificationChannel};
use crate::persist::JsonFile;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub notified: Vec<LiveNotice>,
    /// `(login, error)` for channels whose check failed this cycle.
    pub failures: Vec<(String, String)>,
}

pub struct LiveStatusTracker {
    channels: Vec<String>,
    api: Arc<dyn StreamStatusApi>,
    notifier: Arc<dyn NotificationChannel>,
    file: JsonFile<LiveStateMap>,
    states: LiveStateMap,
    app_token: AppTokenCache,
}

impl LiveStatusTracker {
    pub fn new(
        channels: impl IntoIterator<Item = String>,
        api: Arc<dyn StreamStatusApi>,
        notifier: Arc<dyn NotificationChannel>,
        file: JsonFile<LiveStateMap>,
        states: LiveStateMap,
    ) -> Self {
        let mut channels: Vec<String> = channels
            .into_iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        channels.sort_unstable();
        channels.dedup();
        Self {
            channels,
            api,
            notifier,
            file,
            states,
            app_token: AppTokenCache::new(),
        }
    }

    /// Create a tracker with the persisted states. An unreadable file starts everyone offline.
    pub async fn open(
        channels: impl IntoIterator<Item = String>,
        api: Arc<dyn StreamStatusApi>,
        notifier: Arc<dyn NotificationChannel>,
        file: JsonFile<LiveStateMap>,
    ) -> Self {
        let states = match file.load().await {
            Ok(states) => states.unwrap_or_default(),
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "Ignoring unreadable live state");
                LiveStateMap::new()
            }
        };
        Self::new(channels, api, notifier, file, states)
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Current state of `login`; unseen channels are offline.
    pub fn state(&self, login: &str) -> LiveState {
        self.states
            .get(&login.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Check every channel once. Failures are per channel and never stop the cycle.
    #[instrument(skip(self), fields(channels = self.channels.len()))]
    pub async fn poll_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut changed = false;

        for login in self.channels.clone() {
            report.checked += 1;
            match self.check_channel(&login).await {
                Ok((notice, updated)) => {
                    changed |= updated;
                    report.notified.extend(notice);
                }
                Err(e) => {
                    warn!(login = %login, error = %e, "Live check failed");
                    report.failures.push((login, e.to_string()));
                }
            }
        }

        if changed && let Err(e) = self.file.save(self.states.clone()).await {
            error!(error = %e, "Failed to persist live state");
        }
        report
    }

    /// Returns the notice sent (if any) and whether the stored state changed.
    async fn check_channel(&mut self, login: &str) -> Result<(Option<LiveNotice>, bool)> {
        let token = self.app_token.get(self.api.as_ref()).await?;
        let stream = match self.api.live_stream(&token, login).await {
            Ok(stream) => stream,
            Err(e) => {
                if e.is_unauthorized() {
                    debug!("App token rejected; it will be renewed on the next check");
                    self.app_token.evict();
                }
                return Err(e.into());
            }
        };

        let current = self.state(login);
        let (transition, next) = current.observe(stream.as_ref().map(|s| Some(s.id.as_str())));

        let mut notice = None;
        if transition.notifies()
            && let Some(stream) = &stream
        {
            let live = LiveNotice::from_stream(login, stream);
            // State only advances once the announcement is out.
            self.notifier.send(&live).await?;
            info!(login, stream_id = %live.stream_id, title = %live.title, ?transition, "Channel is live");
            notice = Some(live);
        } else if transition == Transition::WentOffline {
            info!(login, "Channel went offline");
        }

        let updated = current != next;
        if updated {
            self.states.insert(login.to_string(), next);
        }
        Ok((notice, updated))
    }

    /// Start the polling loop. The first cycle runs immediately.
    pub fn spawn(self, period: Duration, cancel: CancellationToken) -> (TrackerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(period, rx, cancel));
        (TrackerHandle { tx }, task)
    }

    async fn run(mut self, period: Duration, mut commands: mpsc::Receiver<TrackerCommand>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            channels = ?self.channels,
            notifier = self.notifier.channel_type(),
            period_secs = period.as_secs(),
            "Live status tracker started"
        );

        let mut handles_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.poll_cycle().await;
                    debug!(checked = report.checked, notified = report.notified.len(), failures = report.failures.len(), "Live poll finished");
                }
                command = commands.recv(), if handles_open => match command {
                    Some(TrackerCommand::CheckNow { reply }) => {
                        let report = self.poll_cycle().await;
                        let _ = reply.send(report);
                    }
                    // Every handle is gone; keep polling on the timer.
                    None => handles_open = false,
                },
            }
        }
        info!("Live status tracker stopped");
    }
}

enum TrackerCommand {
    CheckNow { reply: oneshot::Sender<CycleReport> },
}

#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    /// Run one poll cycle right away and wait for its report.
    pub async fn check_now(&self) -> Result<CycleReport> {
        let (reply, report) = oneshot::channel();
        self.tx
            .send(TrackerCommand::CheckNow { reply })
            .await
            .map_err(|_| Error::Other("live status tracker has stopped".into()))?;
        report
            .await
            .map_err(|_| Error::Other("live status tracker dropped the request".into()))
    }
}
