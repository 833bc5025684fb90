//! Minimal Discord gateway session surfacing guild member dispatches.
//!
//! Only what the role feed needs is implemented: hello, identify, heartbeat and
//! reconnect on any failure. Sessions are not resumed; a reconnect re-identifies.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, trace, warn};

use super::models::User;
use crate::error::{PlatformError, Result};

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// `GUILDS` intent.
pub const INTENT_GUILDS: u64 = 1 << 0;
/// `GUILD_MEMBERS` (privileged) intent, required for member dispatches.
pub const INTENT_GUILD_MEMBERS: u64 = 1 << 1;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready {
        session_id: String,
    },
    MemberAdd {
        guild_id: String,
        user_id: String,
        roles: Vec<String>,
    },
    MemberUpdate {
        guild_id: String,
        user_id: String,
        roles: Vec<String>,
    },
    MemberRemove {
        guild_id: String,
        user_id: String,
    },
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Deserialize)]
struct MemberPayload {
    guild_id: String,
    user: User,
    #[serde(default)]
    roles: Vec<String>,
}

/// Decode a dispatch (`op 0`) body into an event this crate cares about.
pub fn parse_dispatch(event_type: &str, data: &Value) -> Option<GatewayEvent> {
    match event_type {
        "READY" => data
            .get("session_id")
            .and_then(Value::as_str)
            .map(|id| GatewayEvent::Ready {
                session_id: id.to_string(),
            }),
        "GUILD_MEMBER_ADD" | "GUILD_MEMBER_UPDATE" => {
            let member: MemberPayload = serde_json::from_value(data.clone()).ok()?;
            let (guild_id, user_id, roles) = (member.guild_id, member.user.id, member.roles);
            Some(if event_type == "GUILD_MEMBER_ADD" {
                GatewayEvent::MemberAdd {
                    guild_id,
                    user_id,
                    roles,
                }
            } else {
                GatewayEvent::MemberUpdate {
                    guild_id,
                    user_id,
                    roles,
                }
            })
        }
        "GUILD_MEMBER_REMOVE" => {
            let guild_id = data.get("guild_id")?.as_str()?.to_string();
            let user_id = data.get("user")?.get("id")?.as_str()?.to_string();
            Some(GatewayEvent::MemberRemove { guild_id, user_id })
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u64,
    pub url: String,
    pub reconnect_delay: Duration,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: INTENT_GUILDS | INTENT_GUILD_MEMBERS,
            url: GATEWAY_URL.to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

enum SessionEnd {
    /// Reconnect after the configured delay.
    Reconnect,
    /// The event receiver is gone; stop for good.
    ReceiverClosed,
}

pub struct GatewayClient {
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Keep a session open, forwarding events until the receiver is dropped.
    pub async fn run(&self, events: mpsc::Sender<GatewayEvent>) {
        crate::http::install_rustls_provider();
        loop {
            match self.session(&events).await {
                Ok(SessionEnd::ReceiverClosed) => {
                    debug!("Gateway event receiver closed; stopping");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("Gateway session ended; reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, "Gateway session failed");
                }
            }
            if events.is_closed() {
                return;
            }
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn session(&self, events: &mpsc::Sender<GatewayEvent>) -> Result<SessionEnd> {
        let (mut stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| PlatformError::Network(format!("gateway connect failed: {e}")))?;

        let heartbeat_interval = match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let hello: GatewayPayload = serde_json::from_str(text.as_str())?;
                if hello.op != OP_HELLO {
                    return Err(PlatformError::InvalidResponse(format!(
                        "expected hello, got op {}",
                        hello.op
                    )));
                }
                hello
                    .d
                    .get("heartbeat_interval")
                    .and_then(Value::as_u64)
                    .map(Duration::from_millis)
                    .ok_or_else(|| {
                        PlatformError::InvalidResponse("hello without heartbeat_interval".into())
                    })?
            }
            Some(Ok(other)) => {
                return Err(PlatformError::InvalidResponse(format!(
                    "unexpected first frame: {other:?}"
                )));
            }
            Some(Err(e)) => return Err(PlatformError::Network(e.to_string())),
            None => return Ok(SessionEnd::Reconnect),
        };

        let identify = json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.config.token,
                "intents": self.config.intents,
                "properties": { "os": std::env::consts::OS, "browser": "twitchcord", "device": "twitchcord" },
            }
        });
        stream
            .send(Message::Text(identify.to_string().into()))
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let mut last_sequence: Option<u64> = None;
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = json!({ "op": OP_HEARTBEAT, "d": last_sequence });
                    if let Err(e) = stream.send(Message::Text(beat.to_string().into())).await {
                        error!("Failed to send heartbeat: {}", e);
                        return Ok(SessionEnd::Reconnect);
                    }
                    trace!(?last_sequence, "Sent heartbeat");
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            warn!(?frame, "Gateway closed the connection");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(PlatformError::Network(e.to_string())),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "Undecodable gateway payload");
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        last_sequence = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => {
                            let Some(event) = payload
                                .t
                                .as_deref()
                                .and_then(|t| parse_dispatch(t, &payload.d))
                            else {
                                continue;
                            };
                            if events.send(event).await.is_err() {
                                let _ = stream.close(None).await;
                                return Ok(SessionEnd::ReceiverClosed);
                            }
                        }
                        OP_HEARTBEAT => {
                            let beat = json!({ "op": OP_HEARTBEAT, "d": last_sequence });
                            if let Err(e) = stream.send(Message::Text(beat.to_string().into())).await {
                                error!("Failed to answer heartbeat request: {}", e);
                                return Ok(SessionEnd::Reconnect);
                            }
                        }
                        OP_RECONNECT | OP_INVALID_SESSION => {
                            info!(op = payload.op, "Gateway requested a new session");
                            let _ = stream.close(None).await;
                            return Ok(SessionEnd::Reconnect);
                        }
                        OP_HEARTBEAT_ACK => {}
                        other => trace!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}
