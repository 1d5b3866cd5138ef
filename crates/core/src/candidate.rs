//! Candidate context, the unit of shared, mutable state.
//!
//! One [`CandidateContext`] exists per candidate identifier. It accumulates
//! the six required fields, open-ended additional context, the last lookup
//! result, and an append-only recommendation history. Every enumerated field
//! is a closed Rust enum, so invalid values cannot be stored at all: they are
//! rejected by `FromStr` at the extraction boundary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::lookup::CachedLookup;
use crate::recommendation::RecommendationSnapshot;

/// Error returned when a free-text value is outside a field's domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {} (expected {})", .field.display_name(), .field.allowed_values())]
pub struct ParseFieldError {
    pub field: RequiredField,
    pub value: String,
}

impl ParseFieldError {
    fn new(field: RequiredField, value: &str) -> Self {
        Self {
            field,
            value: value.trim().to_string(),
        }
    }
}

// ── Required fields ───────────────────────────────────────────────────────

/// The six fields that must be known before a recommendation is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    CandidateId,
    JobTitle,
    JobLevel,
    Location,
    JobFamily,
    InterviewFeedback,
}

impl RequiredField {
    /// All required fields, in the order they are asked for.
    pub const ALL: [RequiredField; 6] = [
        Self::CandidateId,
        Self::JobTitle,
        Self::JobLevel,
        Self::Location,
        Self::JobFamily,
        Self::InterviewFeedback,
    ];

    /// The snake_case key used in JSON and audit entries.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CandidateId => "candidate_id",
            Self::JobTitle => "job_title",
            Self::JobLevel => "job_level",
            Self::Location => "location",
            Self::JobFamily => "job_family",
            Self::InterviewFeedback => "interview_feedback",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::CandidateId => "Candidate ID",
            Self::JobTitle => "Job Title",
            Self::JobLevel => "Job Level (P1-P5)",
            Self::Location => "Location",
            Self::JobFamily => "Job Family",
            Self::InterviewFeedback => "Interview Panel Feedback (Must Hire/Strong Hire/Hire)",
        }
    }

    fn allowed_values(&self) -> &'static str {
        match self {
            Self::CandidateId => "CAND-XXX",
            Self::JobTitle => "a job title",
            Self::JobLevel => "P1, P2, P3, P4 or P5",
            Self::Location => "LAX, SEA, STL, DUB, SHA, SYD or SIN",
            Self::JobFamily => {
                "Engineering, Sales, Marketing, HR, Finance, Operations, Legal or Executive"
            }
            Self::InterviewFeedback => "Must Hire, Strong Hire or Hire",
        }
    }

    /// A clarifying question that asks for this field and nothing else.
    pub fn question(&self) -> &'static str {
        match self {
            Self::CandidateId => {
                "Which candidate is this for? Please share the candidate ID (for example CAND-001)."
            }
            Self::JobTitle => "What is the job title for this role?",
            Self::JobLevel => "What job level is this role (P1 to P5)?",
            Self::Location => {
                "Which location is this role based in? Supported locations are LAX, SEA, STL, DUB, SHA, SYD and SIN."
            }
            Self::JobFamily => {
                "Which job family does this role belong to (Engineering, Sales, Marketing, HR, Finance, Operations, Legal or Executive)?"
            }
            Self::InterviewFeedback => {
                "What was the interview panel's feedback: Must Hire, Strong Hire or Hire?"
            }
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ── Enumerated domains ────────────────────────────────────────────────────

/// Job level, P1 (entry) through P5 (principal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobLevel {
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl JobLevel {
    pub const ALL: [JobLevel; 5] = [Self::P1, Self::P2, Self::P3, Self::P4, Self::P5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
            Self::P5 => "P5",
        }
    }
}

impl FromStr for JobLevel {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let normalized = normalized
            .strip_prefix("LEVEL")
            .map(|rest| format!("P{}", rest.trim()))
            .unwrap_or(normalized);
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| ParseFieldError::new(RequiredField::JobLevel, s))
    }
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Office site codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "LAX")]
    Lax,
    #[serde(rename = "SEA")]
    Sea,
    #[serde(rename = "STL")]
    Stl,
    #[serde(rename = "DUB")]
    Dub,
    #[serde(rename = "SHA")]
    Sha,
    #[serde(rename = "SYD")]
    Syd,
    #[serde(rename = "SIN")]
    Sin,
}

impl Location {
    pub const ALL: [Location; 7] = [
        Self::Lax,
        Self::Sea,
        Self::Stl,
        Self::Dub,
        Self::Sha,
        Self::Syd,
        Self::Sin,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Lax => "LAX",
            Self::Sea => "SEA",
            Self::Stl => "STL",
            Self::Dub => "DUB",
            Self::Sha => "SHA",
            Self::Syd => "SYD",
            Self::Sin => "SIN",
        }
    }

    pub fn city(&self) -> &'static str {
        match self {
            Self::Lax => "Los Angeles",
            Self::Sea => "Seattle",
            Self::Stl => "St. Louis",
            Self::Dub => "Dublin",
            Self::Sha => "Shanghai",
            Self::Syd => "Sydney",
            Self::Sin => "Singapore",
        }
    }

    /// Local currency for the site.
    pub fn currency(&self) -> &'static str {
        match self {
            Self::Lax | Self::Sea | Self::Stl => "USD",
            Self::Dub => "EUR",
            Self::Sha => "CNY",
            Self::Syd => "AUD",
            Self::Sin => "SGD",
        }
    }

    /// Lowercase free-text names that map onto this site.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Lax => &["los angeles", "la", "l.a.", "santa monica", "venice"],
            Self::Sea => &["seattle", "bellevue", "redmond", "wa", "washington"],
            Self::Stl => &["st. louis", "st louis", "saint louis", "missouri", "mo"],
            Self::Dub => &["dublin", "ireland"],
            Self::Sha => &["shanghai", "china"],
            Self::Syd => &["sydney", "australia", "nsw"],
            Self::Sin => &["singapore"],
        }
    }
}

impl FromStr for Location {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().trim_end_matches([',', ';']).to_lowercase();
        Self::ALL
            .into_iter()
            .find(|loc| {
                loc.code().eq_ignore_ascii_case(&lowered)
                    || loc.aliases().contains(&lowered.as_str())
            })
            .ok_or_else(|| ParseFieldError::new(RequiredField::Location, s))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Job family categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobFamily {
    Engineering,
    Sales,
    Marketing,
    #[serde(rename = "HR")]
    Hr,
    Finance,
    Operations,
    Legal,
    Executive,
}

impl JobFamily {
    pub const ALL: [JobFamily; 8] = [
        Self::Engineering,
        Self::Sales,
        Self::Marketing,
        Self::Hr,
        Self::Finance,
        Self::Operations,
        Self::Legal,
        Self::Executive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engineering => "Engineering",
            Self::Sales => "Sales",
            Self::Marketing => "Marketing",
            Self::Hr => "HR",
            Self::Finance => "Finance",
            Self::Operations => "Operations",
            Self::Legal => "Legal",
            Self::Executive => "Executive",
        }
    }
}

impl FromStr for JobFamily {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let family = match lowered.as_str() {
            "engineering" | "eng" => Self::Engineering,
            "sales" => Self::Sales,
            "marketing" => Self::Marketing,
            "hr" | "human resources" | "people" => Self::Hr,
            "finance" => Self::Finance,
            "operations" | "ops" => Self::Operations,
            "legal" => Self::Legal,
            "executive" | "exec" => Self::Executive,
            _ => return Err(ParseFieldError::new(RequiredField::JobFamily, s)),
        };
        Ok(family)
    }
}

impl fmt::Display for JobFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interview panel outcome. Negative outcomes are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterviewFeedback {
    #[serde(rename = "Must Hire")]
    MustHire,
    #[serde(rename = "Strong Hire")]
    StrongHire,
    #[serde(rename = "Hire")]
    Hire,
}

impl InterviewFeedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MustHire => "Must Hire",
            Self::StrongHire => "Strong Hire",
            Self::Hire => "Hire",
        }
    }
}

impl FromStr for InterviewFeedback {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase().replace(['-', '_'], " ");
        let normalized = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

        const NEGATIVE: [&str; 4] = ["no hire", "do not hire", "don't hire", "not hire"];
        if NEGATIVE.iter().any(|neg| normalized.contains(neg)) {
            return Err(ParseFieldError::new(RequiredField::InterviewFeedback, s));
        }

        if normalized.contains("must hire") {
            Ok(Self::MustHire)
        } else if normalized.contains("strong hire") {
            Ok(Self::StrongHire)
        } else if normalized == "hire" || normalized.ends_with(" hire") {
            Ok(Self::Hire)
        } else {
            Err(ParseFieldError::new(RequiredField::InterviewFeedback, s))
        }
    }
}

impl fmt::Display for InterviewFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proficiency tier, as recorded in the employee roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proficiency {
    Learning,
    Proficient,
    Advanced,
}

impl Proficiency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "Learning",
            Self::Proficient => "Proficient",
            Self::Advanced => "Advanced",
        }
    }
}

impl FromStr for Proficiency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "learning" => Ok(Self::Learning),
            "proficient" => Ok(Self::Proficient),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown proficiency '{other}'")),
        }
    }
}

impl fmt::Display for Proficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a candidate shows up in active listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    #[default]
    Open,
    Closed,
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closed => "closed",
        })
    }
}

// ── Additional context ────────────────────────────────────────────────────

/// Free-form facts gathered from the conversation.
///
/// Known keys carry typed values; anything else is kept verbatim in `extra`.
/// Merging is last-write-wins per key and never drops unrelated keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_offer: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_salary: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_bonus_request: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocation_needed: Option<bool>,

    /// Unrecognized keys, preserved as opaque strings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl AdditionalContext {
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Merge `newer` over `self`: keys present in `newer` win, others persist.
    pub fn merge(&mut self, newer: &AdditionalContext) {
        if newer.counter_offer.is_some() {
            self.counter_offer = newer.counter_offer;
        }
        if newer.current_salary.is_some() {
            self.current_salary = newer.current_salary;
        }
        if newer.signing_bonus_request.is_some() {
            self.signing_bonus_request = newer.signing_bonus_request;
        }
        if newer.urgency.is_some() {
            self.urgency.clone_from(&newer.urgency);
        }
        if newer.special_notes.is_some() {
            self.special_notes.clone_from(&newer.special_notes);
        }
        if newer.relocation_needed.is_some() {
            self.relocation_needed = newer.relocation_needed;
        }
        for (key, value) in &newer.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Flattened key/value view, values rendered as display strings.
    pub fn entries(&self) -> BTreeMap<String, String> {
        let mut out = self.extra.clone();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                out.insert(key.to_string(), v);
            }
        };
        put("counter_offer", self.counter_offer.map(format_amount));
        put("current_salary", self.current_salary.map(format_amount));
        put(
            "signing_bonus_request",
            self.signing_bonus_request.map(format_amount),
        );
        put("urgency", self.urgency.clone());
        put("special_notes", self.special_notes.clone());
        put("relocation_needed", self.relocation_needed.map(|b| b.to_string()));
        out
    }
}

/// Render a currency amount without trailing zeros for whole numbers.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

// ── Candidate context ─────────────────────────────────────────────────────

/// The six required fields, all present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteFields {
    pub candidate_id: String,
    pub job_title: String,
    pub job_level: JobLevel,
    pub location: Location,
    pub job_family: JobFamily,
    pub interview_feedback: InterviewFeedback,
}

/// Per-candidate structured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateContext {
    pub candidate_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_level: Option<JobLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_family: Option<JobFamily>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_feedback: Option<InterviewFeedback>,

    /// Optional proficiency tier, used to narrow the parity narrative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<Proficiency>,

    #[serde(default)]
    pub additional_context: AdditionalContext,

    /// Last-fetched lookup rows, tagged with the key they were fetched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_lookup: Option<CachedLookup>,

    /// Append-only history of produced recommendations.
    #[serde(default)]
    pub recommendation_history: Vec<RecommendationSnapshot>,

    #[serde(default)]
    pub status: CandidateStatus,

    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl CandidateContext {
    /// A fresh, open record with nothing but an identifier.
    pub fn new(candidate_id: impl Into<String>, user: &str, now: DateTime<Utc>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            job_title: None,
            job_level: None,
            location: None,
            job_family: None,
            interview_feedback: None,
            proficiency: None,
            additional_context: AdditionalContext::default(),
            cached_lookup: None,
            recommendation_history: Vec::new(),
            status: CandidateStatus::Open,
            created_at: now,
            created_by: user.to_string(),
            updated_at: now,
            updated_by: user.to_string(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == CandidateStatus::Open
    }

    /// True once `retention` has elapsed since the last update.
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        now - self.updated_at > retention
    }

    pub fn has_field(&self, field: RequiredField) -> bool {
        match field {
            RequiredField::CandidateId => !self.candidate_id.trim().is_empty(),
            RequiredField::JobTitle => self
                .job_title
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
            RequiredField::JobLevel => self.job_level.is_some(),
            RequiredField::Location => self.location.is_some(),
            RequiredField::JobFamily => self.job_family.is_some(),
            RequiredField::InterviewFeedback => self.interview_feedback.is_some(),
        }
    }

    /// Required fields still unset, in asking order.
    pub fn missing_fields(&self) -> Vec<RequiredField> {
        RequiredField::ALL
            .into_iter()
            .filter(|f| !self.has_field(*f))
            .collect()
    }

    /// The single field to ask about next, if any.
    pub fn next_missing(&self) -> Option<RequiredField> {
        RequiredField::ALL.into_iter().find(|f| !self.has_field(*f))
    }

    /// All required fields, or the first one that is missing.
    pub fn complete(&self) -> Result<CompleteFields, RequiredField> {
        if let Some(missing) = self.next_missing() {
            return Err(missing);
        }
        match (
            &self.job_title,
            self.job_level,
            self.location,
            self.job_family,
            self.interview_feedback,
        ) {
            (Some(title), Some(level), Some(location), Some(family), Some(feedback)) => {
                Ok(CompleteFields {
                    candidate_id: self.candidate_id.clone(),
                    job_title: title.trim().to_string(),
                    job_level: level,
                    location,
                    job_family: family,
                    interview_feedback: feedback,
                })
            }
            _ => Err(RequiredField::JobTitle),
        }
    }

    /// Display value of a required field, for audit and status output.
    pub fn field_value(&self, field: RequiredField) -> Option<String> {
        match field {
            RequiredField::CandidateId => Some(self.candidate_id.clone()),
            RequiredField::JobTitle => self.job_title.clone(),
            RequiredField::JobLevel => self.job_level.map(|v| v.to_string()),
            RequiredField::Location => self.location.map(|v| v.to_string()),
            RequiredField::JobFamily => self.job_family.map(|v| v.to_string()),
            RequiredField::InterviewFeedback => self.interview_feedback.map(|v| v.to_string()),
        }
    }
}

// ── Patches ───────────────────────────────────────────────────────────────

/// A field-level update. Only `Some` fields are written, so two users
/// patching different fields of the same candidate never clobber each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    pub job_title: Option<String>,
    pub job_level: Option<JobLevel>,
    pub location: Option<Location>,
    pub job_family: Option<JobFamily>,
    pub interview_feedback: Option<InterviewFeedback>,
    pub proficiency: Option<Proficiency>,
    /// Merged key-by-key over the stored additional context.
    pub additional_context: AdditionalContext,
    pub status: Option<CandidateStatus>,
    pub cached_lookup: Option<CachedLookup>,
    /// Appended to the recommendation history.
    pub recommendation: Option<RecommendationSnapshot>,
}

impl ContextPatch {
    pub fn is_empty(&self) -> bool {
        self == &ContextPatch::default()
    }

    /// Write this patch onto `ctx`. Returns whether anything changed.
    pub fn apply_to(&self, ctx: &mut CandidateContext, user: &str, now: DateTime<Utc>) -> bool {
        let before = ctx.clone();

        if let Some(title) = &self.job_title {
            ctx.job_title = Some(title.clone());
        }
        if self.job_level.is_some() {
            ctx.job_level = self.job_level;
        }
        if self.location.is_some() {
            ctx.location = self.location;
        }
        if self.job_family.is_some() {
            ctx.job_family = self.job_family;
        }
        if self.interview_feedback.is_some() {
            ctx.interview_feedback = self.interview_feedback;
        }
        if self.proficiency.is_some() {
            ctx.proficiency = self.proficiency;
        }
        ctx.additional_context.merge(&self.additional_context);
        if let Some(status) = self.status {
            if status != ctx.status {
                ctx.closed_at = match status {
                    CandidateStatus::Closed => Some(now),
                    CandidateStatus::Open => None,
                };
            }
            ctx.status = status;
        }
        if let Some(cache) = &self.cached_lookup {
            ctx.cached_lookup = Some(cache.clone());
        }
        if let Some(snapshot) = &self.recommendation {
            ctx.recommendation_history.push(snapshot.clone());
        }

        let changed = *ctx != before;
        if changed {
            ctx.updated_at = now;
            ctx.updated_by = user.to_string();
        }
        changed
    }
}
