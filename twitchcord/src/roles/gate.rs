use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes privileged-role mutations per Twitch broadcaster.
///
/// Shared by the reactor and the syncer; whoever holds the guard is the only
/// one mutating that broadcaster's roles.
#[derive(Default)]
pub struct RoleMutationGate {
    scopes: DashMap<String, Arc<Mutex<()>>>,
}

impl RoleMutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, broadcaster_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .scopes
            .entry(broadcaster_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
