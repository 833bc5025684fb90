//! Runtime log filter.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct LogFilterResponse {
    pub filter: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/logging", get(get_filter).put(update_filter))
}

fn logging(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Runtime log control is not available"))
}

async fn get_filter(State(state): State<AppState>) -> ApiResult<Json<LogFilterResponse>> {
    Ok(Json(LogFilterResponse {
        filter: logging(&state)?.get_filter(),
    }))
}

async fn update_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LogFilterResponse>> {
    let logging = logging(&state)?;
    logging
        .set_filter(request.filter.trim())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(LogFilterResponse {
        filter: logging.get_filter(),
    }))
}
