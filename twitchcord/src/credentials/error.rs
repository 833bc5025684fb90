//! Credential error types.

use platforms_client::PlatformError;
use thiserror::Error;

/// Errors returned by the credential store.
///
/// Cloneable so that one refresh outcome can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Nothing stored yet.
    #[error("No broadcaster credential stored")]
    Missing,

    /// The record cannot be renewed without the user.
    #[error("Stored credential has no refresh token")]
    MissingRefreshToken,

    /// The token endpoint refused the refresh token.
    #[error("Refresh grant rejected ({status}): {body}")]
    RefreshRejected { status: u16, body: String },

    /// Timeout, network failure or server error during refresh.
    #[error("Refresh attempt failed: {0}")]
    Transient(String),
}

impl CredentialError {
    /// Check if this error requires a new interactive authorization.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::Missing | Self::MissingRefreshToken | Self::RefreshRejected { .. }
        )
    }

    pub(crate) fn from_refresh_failure(err: PlatformError) -> Self {
        match err {
            PlatformError::Api { status, body } if (400..500).contains(&status) => {
                Self::RefreshRejected { status, body }
            }
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<CredentialError> for crate::Error {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing => crate::Error::CredentialMissing,
            other => crate::Error::CredentialRefreshFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_failure_classification() {
        let rejected = CredentialError::from_refresh_failure(PlatformError::api(400, "Invalid refresh token"));
        assert!(rejected.requires_reauthorization());

        let server = CredentialError::from_refresh_failure(PlatformError::api(503, "unavailable"));
        assert!(!server.requires_reauthorization());

        let timeout = CredentialError::from_refresh_failure(PlatformError::Timeout("token".into()));
        assert!(matches!(timeout, CredentialError::Transient(_)));
    }

    #[test]
    fn test_maps_to_application_error() {
        assert!(matches!(
            crate::Error::from(CredentialError::Missing),
            crate::Error::CredentialMissing
        ));
        let err = crate::Error::from(CredentialError::MissingRefreshToken);
        assert!(err.is_credential_terminal());
    }
}
