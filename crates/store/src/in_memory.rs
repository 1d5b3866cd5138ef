//! In-memory context store: useful for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use compagent_core::audit::AuditEntry;
use compagent_core::candidate::{CandidateContext, ContextPatch};
use compagent_core::error::StoreError;
use compagent_core::store::ContextStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::state::ContextState;

/// A context store that keeps everything in a locked [`ContextState`].
pub struct InMemoryContextStore {
    state: Arc<RwLock<ContextState>>,
}

impl InMemoryContextStore {
    pub fn new(retention_days: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(ContextState::new(retention_days))),
        }
    }
}

impl Default for InMemoryContextStore {
    fn default() -> Self {
        Self::new(compagent_core::DEFAULT_RETENTION_DAYS)
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, candidate_id: &str) -> Result<Option<CandidateContext>, StoreError> {
        Ok(self.state.read().await.get(candidate_id, Utc::now()).cloned())
    }

    async fn put(
        &self,
        context: CandidateContext,
        user: &str,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.state.write().await.put(context, user, Utc::now()))
    }

    async fn apply(
        &self,
        candidate_id: &str,
        patch: &ContextPatch,
        user: &str,
    ) -> Result<CandidateContext, StoreError> {
        let (ctx, entries) = self
            .state
            .write()
            .await
            .apply(candidate_id, patch, user, Utc::now());
        debug!(candidate_id, changes = entries.len(), "Context patched");
        Ok(ctx)
    }

    async fn append_audit(
        &self,
        _candidate_id: &str,
        entries: Vec<AuditEntry>,
    ) -> Result<(), StoreError> {
        self.state.write().await.append_audit(entries);
        Ok(())
    }

    async fn audit_log(&self, candidate_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.state.read().await.audit_log(candidate_id))
    }

    async fn list_active(&self, user: &str) -> Result<Vec<CandidateContext>, StoreError> {
        debug!(user, "Listing active candidates");
        Ok(self.state.read().await.list_active(Utc::now()))
    }

    async fn list_closed(&self) -> Result<Vec<CandidateContext>, StoreError> {
        Ok(self.state.read().await.list_closed(Utc::now()))
    }

    async fn reset(&self, candidate_id: &str, user: &str) -> Result<bool, StoreError> {
        Ok(self.state.write().await.reset(candidate_id, user, Utc::now()))
    }
}
