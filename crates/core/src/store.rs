//! Context Store trait: persistence for candidate records and their audit log.
//!
//! Records are shared across users. Writes go through [`ContextStore::apply`],
//! which merges a [`ContextPatch`] field by field under the store's own lock
//! and appends one [`AuditEntry`] per changed field. Expiry is enforced here:
//! a record untouched for longer than the retention window reads as absent.

use async_trait::async_trait;

use crate::audit::AuditEntry;
use crate::candidate::{CandidateContext, ContextPatch};
use crate::error::StoreError;

/// Audit field name recorded when a record is deleted.
pub const RESET_FIELD: &str = "reset";

/// Default retention for candidate records, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 60;

/// The candidate record store.
///
/// Implementations: JSON file on disk, in-memory for tests.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The backend name (e.g., "file", "memory").
    fn name(&self) -> &str;

    /// Fetch a record. Expired records read as `None`.
    async fn get(&self, candidate_id: &str) -> Result<Option<CandidateContext>, StoreError>;

    /// Replace a whole record, auditing every field that differs from the
    /// stored version. Returns the entries written.
    async fn put(
        &self,
        context: CandidateContext,
        user: &str,
    ) -> Result<Vec<AuditEntry>, StoreError>;

    /// Merge a patch into a record (creating it if absent) and return the
    /// updated record. Only the fields set on the patch are written.
    async fn apply(
        &self,
        candidate_id: &str,
        patch: &ContextPatch,
        user: &str,
    ) -> Result<CandidateContext, StoreError>;

    /// Append entries to a candidate's audit log.
    async fn append_audit(
        &self,
        candidate_id: &str,
        entries: Vec<AuditEntry>,
    ) -> Result<(), StoreError>;

    /// All audit entries for a candidate, oldest first.
    async fn audit_log(&self, candidate_id: &str) -> Result<Vec<AuditEntry>, StoreError>;

    /// Open, unexpired records, most recently updated first.
    ///
    /// Records are shared, so every user sees every active candidate; `user`
    /// is recorded for tracing only.
    async fn list_active(&self, user: &str) -> Result<Vec<CandidateContext>, StoreError>;

    /// Closed, unexpired records, most recently closed first.
    async fn list_closed(&self) -> Result<Vec<CandidateContext>, StoreError>;

    /// Delete a record. The audit log keeps a `reset` entry. Returns whether
    /// a record existed.
    async fn reset(&self, candidate_id: &str, user: &str) -> Result<bool, StoreError>;
}
