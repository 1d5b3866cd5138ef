//! Immutable audit trail for candidate records.
//!
//! One entry per changed field per write. Entries are never deleted, not
//! even when the candidate record itself is reset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::candidate::{CandidateContext, RequiredField, format_amount};

/// A single field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub candidate_id: String,
    pub user: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A change detected between two versions of a record, before stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    /// Attach user and timestamp.
    pub fn into_entry(self, candidate_id: &str, user: &str, timestamp: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            timestamp,
            candidate_id: candidate_id.to_string(),
            user: user.to_string(),
            field: self.field,
            old_value: self.old_value,
            new_value: self.new_value,
        }
    }
}

/// Field-by-field differences between `before` (absent for a new record)
/// and `after`. Cache refreshes are not audited.
pub fn diff(before: Option<&CandidateContext>, after: &CandidateContext) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &str, old: Option<String>, new: Option<String>| {
        if old != new {
            changes.push(FieldChange {
                field: field.to_string(),
                old_value: old,
                new_value: new,
            });
        }
    };

    for field in RequiredField::ALL {
        if field == RequiredField::CandidateId {
            continue;
        }
        push(
            field.key(),
            before.and_then(|b| b.field_value(field)),
            after.field_value(field),
        );
    }

    push(
        "proficiency",
        before.and_then(|b| b.proficiency).map(|p| p.to_string()),
        after.proficiency.map(|p| p.to_string()),
    );
    push(
        "status",
        before.map(|b| b.status.to_string()),
        Some(after.status.to_string()),
    );

    let old_extra = before
        .map(|b| b.additional_context.entries())
        .unwrap_or_default();
    let new_extra = after.additional_context.entries();
    let keys: BTreeSet<&String> = old_extra.keys().chain(new_extra.keys()).collect();
    for key in keys {
        push(
            &format!("additional_context.{key}"),
            old_extra.get(key).cloned(),
            new_extra.get(key).cloned(),
        );
    }

    let old_len = before.map_or(0, |b| b.recommendation_history.len());
    for snapshot in after.recommendation_history.iter().skip(old_len) {
        push(
            "recommendation_history",
            None,
            Some(format!(
                "total {} {}",
                format_amount(snapshot.recommendation.total_compensation),
                snapshot.recommendation.currency
            )),
        );
    }

    changes
}

/// Issues strictly increasing timestamps, even within one clock tick.
#[derive(Debug, Clone, Default)]
pub struct AuditClock {
    last: Option<DateTime<Utc>>,
}

impl AuditClock {
    pub fn new(last: Option<DateTime<Utc>>) -> Self {
        Self { last }
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(ts);
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{JobLevel, Location};

    #[test]
    fn two_field_update_yields_two_changes() {
        let now = Utc::now();
        let mut before = CandidateContext::new("CAND-001", "a@example.com", now);
        before.job_title = Some("Software Engineer".into());
        let mut after = before.clone();
        after.job_level = Some(JobLevel::P3);
        after.location = Some(Location::Sea);

        let changes = diff(Some(&before), &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "job_level");
        assert_eq!(changes[0].old_value, None);
        assert_eq!(changes[0].new_value.as_deref(), Some("P3"));
        assert_eq!(changes[1].field, "location");
        assert_eq!(changes[1].new_value.as_deref(), Some("SEA"));
    }

    #[test]
    fn new_record_audits_status() {
        let ctx = CandidateContext::new("CAND-002", "a@example.com", Utc::now());
        let changes = diff(None, &ctx);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "status");
        assert_eq!(changes[0].new_value.as_deref(), Some("open"));
    }

    #[test]
    fn additional_context_keys_are_audited_individually() {
        let now = Utc::now();
        let before = CandidateContext::new("CAND-003", "a", now);
        let mut after = before.clone();
        after.additional_context.counter_offer = Some(150_000.0);
        after
            .additional_context
            .extra
            .insert("visa".into(), "needed".into());

        let fields: Vec<String> = diff(Some(&before), &after)
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(
            fields,
            vec!["additional_context.counter_offer", "additional_context.visa"]
        );
    }

    #[test]
    fn unchanged_record_has_no_changes() {
        let ctx = CandidateContext::new("CAND-004", "a", Utc::now());
        assert!(diff(Some(&ctx), &ctx).is_empty());
    }

    #[test]
    fn clock_is_strictly_monotonic() {
        let now = Utc::now();
        let mut clock = AuditClock::default();
        let a = clock.next(now);
        let b = clock.next(now);
        let c = clock.next(now - Duration::seconds(5));
        assert!(a < b);
        assert!(b < c);
    }
}
