//! Application-wide error types.

use platforms_client::PlatformError;
use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No broadcaster credential stored - interactive authorization required")]
    CredentialMissing,

    #[error("Broadcaster credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("Discord user {discord_user_id} has no linked Twitch account")]
    UnlinkedIdentity { discord_user_id: String },

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error during {op} at {path}: {source}")]
    IoPath {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unlinked(discord_user_id: impl Into<String>) -> Self {
        Self::UnlinkedIdentity {
            discord_user_id: discord_user_id.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    /// Conditions that block every role mutation until an operator re-authorizes.
    pub fn is_credential_terminal(&self) -> bool {
        matches!(self, Self::CredentialMissing | Self::CredentialRefreshFailed(_))
    }

    /// Collaborator failures that only skip the current item.
    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Timeout(_) | Self::Network(_))
    }
}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Api { status, body } => Self::Api { status, body },
            PlatformError::Timeout(target) => Self::Timeout(target),
            PlatformError::Network(msg) => Self::Network(msg),
            PlatformError::Json(e) => Self::Serialization(e),
            PlatformError::InvalidResponse(msg) => Self::Network(msg),
        }
    }
}
