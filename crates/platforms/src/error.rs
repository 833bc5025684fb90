use thiserror::Error;

/// Maximum number of characters of a response body kept in [`PlatformError::Api`].
pub const MAX_ERROR_BODY_CHARS: usize = 200;

pub type Result<T> = std::result::Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Build an api error, truncating the body to [`MAX_ERROR_BODY_CHARS`].
    pub fn api(status: u16, body: &str) -> Self {
        Self::Api {
            status,
            body: truncate_body(body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let target = err
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| "request".to_string());
            Self::Timeout(target)
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
