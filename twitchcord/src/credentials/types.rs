//! Core credential types.

use chrono::{DateTime, TimeDelta, Utc};
use platforms_client::twitch::TokenResponse;
use serde::{Deserialize, Serialize};

/// The broadcaster's OAuth credential as persisted on disk.
///
/// `expires_at` is the only source of truth for validity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

fn expiry_from(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + TimeDelta::seconds(expires_in.max(1))
}

impl CredentialRecord {
    /// Build a record from an authorization-code exchange.
    pub fn from_token_response(token: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: expiry_from(now, token.expires_in),
            scope: token.scope,
            obtained_at: now,
        }
    }

    /// Apply a refresh-grant response. The old refresh token is kept unless the provider rotated it.
    pub fn refreshed(&self, token: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expiry_from(now, token.expires_in),
            scope: if token.scope.is_empty() {
                self.scope.clone()
            } else {
                token.scope
            },
            obtained_at: now,
        }
    }

    /// True when the token stays valid for at least `margin` after `now`.
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        self.expires_at > now + margin
    }

    #[inline]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.has_refresh_token())
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Operator-facing view of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStatus {
    Missing,
    Valid { expires_at: DateTime<Utc> },
    NeedsRefresh { expires_at: DateTime<Utc> },
    ReauthorizationRequired { reason: String },
}
