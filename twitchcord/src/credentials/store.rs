//! The broadcaster credential store.
//!
//! Hands out access tokens that stay valid for at least [`REFRESH_MARGIN`].
//! Near expiry it runs the refresh-token grant exactly once no matter how many
//! callers are waiting: the first caller installs a shared cell, the rest await
//! the same outcome.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use platforms_client::twitch::TokenResponse;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use super::error::CredentialError;
use super::grants::TokenGrants;
use super::types::{CredentialRecord, CredentialStatus};
use crate::persist::JsonFile;

/// Minimum remaining lifetime of a token handed to callers.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(2);

type RefreshCell = Arc<OnceCell<Result<String, CredentialError>>>;

#[derive(Default)]
struct StoreState {
    record: Option<CredentialRecord>,
    /// Terminal failure; cleared only by [`CredentialStore::authorize`].
    blocked: Option<CredentialError>,
}

pub struct CredentialStore {
    file: JsonFile<CredentialRecord>,
    grants: Arc<dyn TokenGrants>,
    state: RwLock<StoreState>,
    in_flight: Mutex<Option<RefreshCell>>,
}

impl CredentialStore {
    /// Create a store around an already-loaded record.
    pub fn new(
        file: JsonFile<CredentialRecord>,
        grants: Arc<dyn TokenGrants>,
        record: Option<CredentialRecord>,
    ) -> Self {
        Self {
            file,
            grants,
            state: RwLock::new(StoreState {
                record,
                blocked: None,
            }),
            in_flight: Mutex::new(None),
        }
    }

    /// Load the persisted record (if any) and create the store.
    ///
    /// An unreadable file is treated as missing so the operator can re-authorize.
    pub async fn open(file: JsonFile<CredentialRecord>, grants: Arc<dyn TokenGrants>) -> Self {
        let record = match file.load().await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    path = %file.path().display(),
                    error = %e,
                    "Broadcaster credential file is unreadable - re-authorization required"
                );
                None
            }
        };

        match &record {
            Some(r) => info!(expires_at = %r.expires_at, "Loaded broadcaster credential"),
            None => warn!("No broadcaster credential stored - run the Twitch authorization flow"),
        }

        Self::new(file, grants, record)
    }

    /// A token valid for at least [`REFRESH_MARGIN`], refreshing first when needed.
    pub async fn get_valid_access_token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.current_token()? {
            return Ok(token);
        }

        let cell = {
            let mut slot = self.in_flight.lock();
            Arc::clone(slot.get_or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let outcome = cell.get_or_init(|| self.refresh_once()).await.clone();

        {
            let mut slot = self.in_flight.lock();
            if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                *slot = None;
            }
        }

        outcome
    }

    /// Store the result of an interactive authorization and lift any terminal failure.
    #[instrument(skip_all)]
    pub async fn authorize(&self, token: TokenResponse) -> crate::Result<CredentialRecord> {
        let record = CredentialRecord::from_token_response(token, Utc::now());
        self.file.save(record.clone()).await?;

        {
            let mut state = self.state.write();
            state.record = Some(record.clone());
            state.blocked = None;
        }

        info!(
            expires_at = %record.expires_at,
            scopes = ?record.scope,
            "Broadcaster credential authorized"
        );
        Ok(record)
    }

    pub fn status(&self) -> CredentialStatus {
        let state = self.state.read();
        if let Some(blocked) = &state.blocked {
            return CredentialStatus::ReauthorizationRequired {
                reason: blocked.to_string(),
            };
        }
        match &state.record {
            None => CredentialStatus::Missing,
            Some(r) if r.is_valid_at(Utc::now(), REFRESH_MARGIN) => CredentialStatus::Valid {
                expires_at: r.expires_at,
            },
            Some(r) => CredentialStatus::NeedsRefresh {
                expires_at: r.expires_at,
            },
        }
    }

    pub fn record(&self) -> Option<CredentialRecord> {
        self.state.read().record.clone()
    }

    /// `Ok(Some)` when the stored token is usable now, `Ok(None)` when it needs a refresh.
    fn current_token(&self) -> Result<Option<String>, CredentialError> {
        let state = self.state.read();
        if let Some(blocked) = &state.blocked {
            return Err(blocked.clone());
        }
        let record = state.record.as_ref().ok_or(CredentialError::Missing)?;
        Ok(record
            .is_valid_at(Utc::now(), REFRESH_MARGIN)
            .then(|| record.access_token.clone()))
    }

    fn block(&self, err: &CredentialError) {
        self.state.write().blocked = Some(err.clone());
        error!(
            error = %err,
            "Broadcaster credential can no longer be renewed - re-authorization required"
        );
    }

    #[instrument(skip(self))]
    async fn refresh_once(&self) -> Result<String, CredentialError> {
        // Another refresh may have completed between the fast path and now.
        if let Some(token) = self.current_token()? {
            return Ok(token);
        }

        let Some(current) = self.record() else {
            return Err(CredentialError::Missing);
        };
        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            let err = CredentialError::MissingRefreshToken;
            self.block(&err);
            return Err(err);
        };

        info!(expires_at = %current.expires_at, "Refreshing broadcaster credential");

        let response = match self.grants.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                let err = CredentialError::from_refresh_failure(e);
                if err.requires_reauthorization() {
                    self.block(&err);
                } else {
                    warn!(error = %err, "Credential refresh failed; the next request will retry");
                }
                return Err(err);
            }
        };

        let now = Utc::now();
        let updated = current.refreshed(response, now);
        self.state.write().record = Some(updated.clone());

        if let Err(e) = self.file.save(updated.clone()).await {
            error!(error = %e, "Failed to persist refreshed broadcaster credential");
        }

        if !updated.is_valid_at(now, REFRESH_MARGIN) {
            return Err(CredentialError::Transient(format!(
                "token endpoint issued a token expiring at {}",
                updated.expires_at
            )));
        }

        debug!(expires_at = %updated.expires_at, "Broadcaster credential refreshed");
        Ok(updated.access_token)
    }
}
