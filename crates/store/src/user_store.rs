//! Each user's currently selected candidate.
//!
//! Persisted as a single `user_contexts.json` map of email to candidate id
//! when a path is given; purely in memory otherwise.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use compagent_core::error::StoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const USER_CONTEXTS_FILE: &str = "user_contexts.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserContextEntry {
    current_candidate_id: Option<String>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// Maps a user to the candidate they are working on.
#[derive(Clone, Default)]
pub struct UserContextStore {
    path: Option<PathBuf>,
    entries: Arc<RwLock<HashMap<String, UserContextEntry>>>,
}

impl UserContextStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backed by `user_contexts.json` in `dir`. An unreadable file starts
    /// empty with a warning.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(USER_CONTEXTS_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(error = %e, path = %path.display(), "Ignoring corrupted user context file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path: Some(path),
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// The user's current candidate, if any.
    pub async fn current(&self, user: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(&user.to_lowercase())
            .and_then(|e| e.current_candidate_id.clone())
    }

    /// Select (or, with `None`, clear) the user's current candidate.
    pub async fn set_current(
        &self,
        user: &str,
        candidate_id: Option<String>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        debug!(user, candidate_id = ?candidate_id, "Setting current candidate");
        entries.insert(
            user.to_lowercase(),
            UserContextEntry {
                current_candidate_id: candidate_id,
                updated_at: chrono::Utc::now(),
            },
        );
        self.flush(&entries)
    }

    /// Clear the selection for every user pointing at `candidate_id`.
    pub async fn forget_candidate(&self, candidate_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let mut changed = false;
        for entry in entries.values_mut() {
            if entry.current_candidate_id.as_deref() == Some(candidate_id) {
                entry.current_candidate_id = None;
                changed = true;
            }
        }
        if changed {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn flush(&self, entries: &HashMap<String, UserContextEntry>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("Failed to create store directory: {e}")))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| StoreError::Io(format!("Failed to write user contexts: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_clear_current() {
        let store = UserContextStore::new();
        assert_eq!(store.current("a@example.com").await, None);

        store
            .set_current("A@example.com", Some("CAND-1".into()))
            .await
            .unwrap();
        assert_eq!(store.current("a@example.com").await.as_deref(), Some("CAND-1"));

        store.set_current("a@example.com", None).await.unwrap();
        assert_eq!(store.current("a@example.com").await, None);
    }

    #[tokio::test]
    async fn selection_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserContextStore::open(dir.path());
        store.set_current("a", Some("CAND-7".into())).await.unwrap();

        let reopened = UserContextStore::open(dir.path());
        assert_eq!(reopened.current("a").await.as_deref(), Some("CAND-7"));
    }

    #[tokio::test]
    async fn forgetting_a_candidate_clears_every_user() {
        let store = UserContextStore::new();
        store.set_current("a", Some("CAND-1".into())).await.unwrap();
        store.set_current("b", Some("CAND-1".into())).await.unwrap();
        store.set_current("c", Some("CAND-2".into())).await.unwrap();

        store.forget_candidate("CAND-1").await.unwrap();
        assert_eq!(store.current("a").await, None);
        assert_eq!(store.current("b").await, None);
        assert_eq!(store.current("c").await.as_deref(), Some("CAND-2"));
    }
}
