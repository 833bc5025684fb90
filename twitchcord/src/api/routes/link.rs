//! Discord account linking.

use axum::{
    Router,
    extract::{Query, State},
    response::Redirect,
    routing::get,
};

use super::auth::CallbackQuery;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::links::{LinkOutcome, LinkingService};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discord/link", get(start))
        .route("/discord/callback", get(callback))
}

fn linking(state: &AppState) -> ApiResult<&LinkingService> {
    state
        .linking
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Account linking is not configured"))
}

async fn start(State(state): State<AppState>) -> ApiResult<Redirect> {
    let url = linking(&state)?.authorize_url(None)?;
    Ok(Redirect::to(url.as_str()))
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<String> {
    let linking = linking(&state)?;
    let code = query.into_code()?;

    match linking.complete(&code).await? {
        LinkOutcome::Linked { link, .. } => Ok(format!(
            "Linked! Discord user {} is now connected to Twitch account {}.",
            link.discord_user_id, link.twitch_login
        )),
        LinkOutcome::NoTwitchConnection { username, .. } => Ok(format!(
            "No Twitch connection found for {username}. Connect Twitch under Discord Settings > Connections, then try again."
        )),
    }
}
