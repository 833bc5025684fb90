//! API route definitions.

pub mod auth;
pub mod link;
pub mod logging;

use axum::{Router, extract::State, routing::get};

use crate::api::server::AppState;
use crate::credentials::CredentialStatus;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(auth::router())
        .merge(link::router())
        .merge(logging::router())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> String {
    let credential = match state.credentials.status() {
        CredentialStatus::Missing => "not authorized - visit /auth/twitch/start".to_string(),
        CredentialStatus::Valid { expires_at } => format!("valid until {expires_at}"),
        CredentialStatus::NeedsRefresh { .. } => "refresh pending".to_string(),
        CredentialStatus::ReauthorizationRequired { reason } => {
            format!("re-authorization required ({reason}) - visit /auth/twitch/start")
        }
    };
    format!(
        "Twitch OAuth ready. Go to /auth/twitch/start\nBroadcaster credential: {credential}\nUptime: {}s\n",
        state.start_time.elapsed().as_secs()
    )
}
