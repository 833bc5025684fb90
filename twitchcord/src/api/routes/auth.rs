//! Broadcaster authorization (Twitch authorization-code flow).

use axum::{
    Router,
    extract::{Query, State},
    response::Redirect,
    routing::get,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::error::Error;

/// Scopes the broadcaster grants for VIP and moderator management.
pub const BROADCASTER_SCOPES: [&str; 3] = [
    "channel:manage:vips",
    "channel:manage:moderators",
    "moderation:read",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/twitch/start", get(start))
        .route("/auth/twitch/callback", get(callback))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// The authorization code, or the 400 to answer with.
    pub fn into_code(self) -> ApiResult<String> {
        if let Some(error) = self.error {
            let detail = self.error_description.unwrap_or_default();
            return Err(ApiError::bad_request(format!("Authorization failed: {error} {detail}").trim_end().to_string()));
        }
        self.code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing ?code"))
    }
}

async fn start(State(state): State<AppState>) -> ApiResult<Redirect> {
    let url = state
        .twitch_oauth
        .authorize_url(&BROADCASTER_SCOPES, None)
        .map_err(Error::from)?;
    Ok(Redirect::to(url.as_str()))
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<String> {
    let code = query.into_code()?;

    let token = state.twitch_oauth.exchange_code(&code).await.map_err(|e| {
        warn!(error = %e, "Twitch code exchange failed");
        Error::from(e)
    })?;
    let record = state.credentials.authorize(token).await?;

    info!(expires_at = %record.expires_at, "Broadcaster authorized through the web flow");
    Ok(format!(
        "Tokens saved. The broadcaster credential is valid until {} and will be refreshed automatically.",
        record.expires_at
    ))
}
