//! The identity link collection.
//!
//! Reads are served from an in-memory snapshot that is swapped only after the
//! whole collection has been committed to disk, so readers never see a link
//! that is not durable and never see a partially written collection.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::types::{IdentityLink, UpsertOutcome};
use crate::Result;
use crate::persist::JsonFile;

pub struct IdentityLinkRegistry {
    file: JsonFile<Vec<IdentityLink>>,
    links: RwLock<Arc<Vec<IdentityLink>>>,
    write_lock: Mutex<()>,
}

impl IdentityLinkRegistry {
    pub fn new(file: JsonFile<Vec<IdentityLink>>, links: Vec<IdentityLink>) -> Self {
        Self {
            file,
            links: RwLock::new(Arc::new(links)),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the persisted links. A missing file is an empty registry.
    pub async fn open(file: JsonFile<Vec<IdentityLink>>) -> Result<Self> {
        let links = file.load().await?.unwrap_or_default();
        info!(count = links.len(), path = %file.path().display(), "Loaded identity links");
        Ok(Self::new(file, links))
    }

    /// Insert or replace the link for `link.discord_user_id`.
    ///
    /// Identical input is a no-op and does not touch the file.
    #[instrument(skip(self, link), fields(discord_user_id = %link.discord_user_id))]
    pub async fn upsert(&self, link: IdentityLink) -> Result<UpsertOutcome> {
        let _guard = self.write_lock.lock().await;

        let current = self.snapshot();
        let position = current
            .iter()
            .position(|l| l.discord_user_id == link.discord_user_id);

        let outcome = match position {
            Some(i) if current[i] == link => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };

        let mut next = current.as_ref().clone();
        match position {
            Some(i) => next[i] = link.clone(),
            None => next.push(link.clone()),
        }

        let shared_login = next
            .iter()
            .filter(|l| l.twitch_login.eq_ignore_ascii_case(&link.twitch_login))
            .count();
        if shared_login > 1 {
            warn!(
                twitch_login = %link.twitch_login,
                count = shared_login,
                "Twitch account is linked to more than one Discord user"
            );
        }

        self.file.save(next.clone()).await?;
        *self.links.write() = Arc::new(next);

        info!(
            twitch_user_id = %link.twitch_user_id,
            twitch_login = %link.twitch_login,
            ?outcome,
            "Identity link stored"
        );
        Ok(outcome)
    }

    pub fn by_discord_id(&self, discord_user_id: &str) -> Option<IdentityLink> {
        self.snapshot()
            .iter()
            .find(|l| l.discord_user_id == discord_user_id)
            .cloned()
    }

    /// Case-insensitive lookup by Twitch login.
    pub fn by_twitch_login(&self, login: &str) -> Option<IdentityLink> {
        self.snapshot()
            .iter()
            .find(|l| l.twitch_login.eq_ignore_ascii_case(login))
            .cloned()
    }

    pub fn by_twitch_id(&self, twitch_user_id: &str) -> Option<IdentityLink> {
        if twitch_user_id.is_empty() {
            return None;
        }
        self.snapshot()
            .iter()
            .find(|l| l.twitch_user_id == twitch_user_id)
            .cloned()
    }

    /// Every link, as of the last committed write.
    pub fn all(&self) -> Arc<Vec<IdentityLink>> {
        self.snapshot()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<Vec<IdentityLink>> {
        Arc::clone(&self.links.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(dir: &tempfile::TempDir) -> IdentityLinkRegistry {
        IdentityLinkRegistry::open(JsonFile::open(dir.path().join("links.json")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_discord_id() {
        let dir = tempfile::tempdir().unwrap();
        let links = registry(&dir).await;

        assert_eq!(
            links.upsert(IdentityLink::new("100", "55", "alice")).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            links.upsert(IdentityLink::new("100", "77", "alice2")).await.unwrap(),
            UpsertOutcome::Replaced
        );

        assert_eq!(links.len(), 1);
        let link = links.by_discord_id("100").unwrap();
        assert_eq!(link.twitch_user_id, "77");
        assert!(links.by_twitch_id("55").is_none());
    }

    #[tokio::test]
    async fn test_identical_upsert_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let links = registry(&dir).await;
        let link = IdentityLink::new("100", "55", "alice");

        links.upsert(link.clone()).await.unwrap();
        assert_eq!(links.upsert(link).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let links = registry(&dir).await;
        links.upsert(IdentityLink::new("100", "55", "Alice")).await.unwrap();

        assert_eq!(links.by_twitch_login("ALICE").unwrap().discord_user_id, "100");
        assert_eq!(links.by_twitch_id("55").unwrap().discord_user_id, "100");
        assert!(links.by_twitch_id("").is_none());
        assert!(links.by_discord_id("999").is_none());
    }

    #[tokio::test]
    async fn test_links_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let links = registry(&dir).await;
            links.upsert(IdentityLink::new("100", "55", "alice")).await.unwrap();
            links.upsert(IdentityLink::new("200", "66", "bob")).await.unwrap();
        }

        let reopened = registry(&dir).await;
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.by_twitch_login("bob").unwrap().discord_user_id, "200");

        let raw = std::fs::read_to_string(dir.path().join("links.json")).unwrap();
        assert!(raw.contains("platformAUserId"));
        assert!(!dir.path().join("links.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let links = Arc::new(registry(&dir).await);

        let mut tasks = Vec::new();
        for i in 0..10 {
            let links = Arc::clone(&links);
            tasks.push(tokio::spawn(async move {
                links
                    .upsert(IdentityLink::new(i.to_string(), format!("t{i}"), format!("user{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(links.len(), 10);
        assert_eq!(registry(&dir).await.len(), 10);
    }
}
