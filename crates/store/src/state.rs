//! The record table shared by both context store backends.
//!
//! [`ContextState`] is plain data plus the merge and audit rules; the
//! backends wrap it in a lock and decide whether to persist afterwards.

use chrono::{DateTime, Duration, Utc};
use compagent_core::audit::{self, AuditClock, AuditEntry, FieldChange};
use compagent_core::candidate::{CandidateContext, ContextPatch};
use compagent_core::store::RESET_FIELD;
use std::collections::HashMap;

/// All candidate records and the full audit log.
#[derive(Debug, Clone)]
pub struct ContextState {
    pub contexts: HashMap<String, CandidateContext>,
    pub audit: Vec<AuditEntry>,
    retention: Duration,
    clock: AuditClock,
}

impl ContextState {
    pub fn new(retention_days: u32) -> Self {
        Self::with_records(HashMap::new(), Vec::new(), retention_days)
    }

    /// Rebuild from persisted records. The audit clock resumes after the
    /// latest stored entry.
    pub fn with_records(
        contexts: HashMap<String, CandidateContext>,
        audit: Vec<AuditEntry>,
        retention_days: u32,
    ) -> Self {
        let last = audit.iter().map(|e| e.timestamp).max();
        Self {
            contexts,
            audit,
            retention: Duration::days(i64::from(retention_days)),
            clock: AuditClock::new(last),
        }
    }

    /// An unexpired record.
    pub fn get(&self, candidate_id: &str, now: DateTime<Utc>) -> Option<&CandidateContext> {
        self.contexts
            .get(candidate_id)
            .filter(|ctx| !ctx.is_expired(now, self.retention))
    }

    /// Replace a record and audit the differences.
    pub fn put(
        &mut self,
        context: CandidateContext,
        user: &str,
        now: DateTime<Utc>,
    ) -> Vec<AuditEntry> {
        let id = context.candidate_id.clone();
        let changes = audit::diff(self.get(&id, now), &context);
        let entries = self.stamp(changes, &id, user, now);
        self.contexts.insert(id, context);
        entries
    }

    /// Merge a patch field by field, creating the record if absent or
    /// expired. Returns the updated record and the audit entries written.
    pub fn apply(
        &mut self,
        candidate_id: &str,
        patch: &ContextPatch,
        user: &str,
        now: DateTime<Utc>,
    ) -> (CandidateContext, Vec<AuditEntry>) {
        let existing = self.get(candidate_id, now).cloned();
        let mut updated = existing
            .clone()
            .unwrap_or_else(|| CandidateContext::new(candidate_id, user, now));
        patch.apply_to(&mut updated, user, now);

        let changes = audit::diff(existing.as_ref(), &updated);
        let entries = self.stamp(changes, candidate_id, user, now);
        self.contexts
            .insert(candidate_id.to_string(), updated.clone());
        (updated, entries)
    }

    /// Append externally built entries, keeping timestamps strictly increasing.
    pub fn append_audit(&mut self, entries: Vec<AuditEntry>) {
        for mut entry in entries {
            entry.timestamp = self.clock.next(entry.timestamp);
            self.audit.push(entry);
        }
    }

    pub fn audit_log(&self, candidate_id: &str) -> Vec<AuditEntry> {
        self.audit
            .iter()
            .filter(|e| e.candidate_id == candidate_id)
            .cloned()
            .collect()
    }

    /// Open, unexpired records, most recently updated first.
    pub fn list_active(&self, now: DateTime<Utc>) -> Vec<CandidateContext> {
        let mut active: Vec<CandidateContext> = self
            .contexts
            .values()
            .filter(|c| c.is_open() && !c.is_expired(now, self.retention))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        active
    }

    /// Closed, unexpired records, most recently closed first.
    pub fn list_closed(&self, now: DateTime<Utc>) -> Vec<CandidateContext> {
        let mut closed: Vec<CandidateContext> = self
            .contexts
            .values()
            .filter(|c| !c.is_open() && !c.is_expired(now, self.retention))
            .cloned()
            .collect();
        closed.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        closed
    }

    /// Delete a record, leaving a `reset` audit entry.
    pub fn reset(&mut self, candidate_id: &str, user: &str, now: DateTime<Utc>) -> bool {
        let existed = self.get(candidate_id, now).is_some();
        self.contexts.remove(candidate_id);
        if existed {
            let change = FieldChange {
                field: RESET_FIELD.to_string(),
                old_value: Some("context".into()),
                new_value: None,
            };
            self.stamp(vec![change], candidate_id, user, now);
        }
        existed
    }

    /// Drop expired records. Their audit entries remain.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.contexts.len();
        let retention = self.retention;
        self.contexts
            .retain(|_, ctx| !ctx.is_expired(now, retention));
        before - self.contexts.len()
    }

    fn stamp(
        &mut self,
        changes: Vec<FieldChange>,
        candidate_id: &str,
        user: &str,
        now: DateTime<Utc>,
    ) -> Vec<AuditEntry> {
        let entries: Vec<AuditEntry> = changes
            .into_iter()
            .map(|c| {
                let ts = self.clock.next(now);
                c.into_entry(candidate_id, user, ts)
            })
            .collect();
        self.audit.extend(entries.iter().cloned());
        entries
    }
}
