//! Field Extractor: free text in, a validated partial update out.
//!
//! The completion capability is treated as an untrusted source. Its JSON is
//! parsed field by field through the domain `FromStr` impls; values outside a
//! field's domain are rejected and reported, never coerced.

use std::sync::Arc;
use std::time::Duration;

use compagent_core::candidate::{
    AdditionalContext, CandidateContext, ContextPatch, InterviewFeedback, JobFamily, JobLevel,
    Location, ParseFieldError, Proficiency, RequiredField,
};
use compagent_core::error::{ProviderError, TurnError};
use compagent_core::lookup::Catalog;
use compagent_core::message::Message;
use compagent_core::provider::{Provider, ProviderRequest};
use compagent_store::MessageRecord;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::normalize::{extract_candidate_id, extract_json, is_blank, json_to_text, money_from_json};

/// What kind of message the user sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    OffTopic,
    Compensation,
}

/// The validated result of one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub intent: Intent,
    /// A `CAND-XXX` id the completion found, if the message had one.
    pub candidate_id: Option<String>,
    /// Only values allowed by the merge rule.
    pub patch: ContextPatch,
    /// Values that were outside their field's domain.
    pub rejected: Vec<ParseFieldError>,
    /// Conversational reply for greetings and off-topic messages.
    pub reply: Option<String>,
}

impl Extraction {
    fn conversational(intent: Intent, reply: impl Into<String>) -> Self {
        Self {
            intent,
            candidate_id: None,
            patch: ContextPatch::default(),
            rejected: Vec::new(),
            reply: Some(reply.into()),
        }
    }
}

pub const GREETING_REPLY: &str = "Hi! I can help you put together a compensation recommendation. \
     Which candidate are we working on today?";

pub const OFF_TOPIC_REPLY: &str = "I can only help with compensation recommendations for candidates. \
     Is there a candidate you'd like me to help with?";

const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hi there",
    "hello there",
    "hey there",
    "good morning",
    "good afternoon",
    "good evening",
    "thanks",
    "thank you",
];

/// Messages answered without a completion call.
pub fn is_greeting(message: &str) -> bool {
    let normalized: String = message
        .trim()
        .trim_end_matches(['!', '.', '?', ','])
        .to_lowercase();
    GREETINGS.contains(&normalized.as_str())
}

pub struct FieldExtractor {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl FieldExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extract a partial update from `message`.
    ///
    /// `history` is the recent exchange, oldest first.
    pub async fn extract(
        &self,
        message: &str,
        existing: Option<&CandidateContext>,
        candidate_id: Option<&str>,
        history: &[MessageRecord],
        catalog: &Catalog,
    ) -> Result<Extraction, TurnError> {
        if is_greeting(message) {
            debug!("Greeting answered locally");
            return Ok(Extraction::conversational(Intent::Greeting, GREETING_REPLY));
        }

        let prompt = build_prompt(message, existing, candidate_id, history, catalog);
        let request = ProviderRequest::new(
            &self.model,
            vec![Message::system(prompt), Message::user(message)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .json();

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "extraction took longer than {}s",
                    self.timeout.as_secs()
                ))
                .into());
            }
        };

        let Some(Value::Object(json)) = extract_json(&response.message.content) else {
            warn!(
                provider = %self.provider.name(),
                "Completion did not contain a JSON object; treating as no new fields"
            );
            return Ok(Extraction {
                intent: Intent::Compensation,
                candidate_id: None,
                patch: ContextPatch::default(),
                rejected: Vec::new(),
                reply: None,
            });
        };

        Ok(interpret(&json, message, existing, catalog))
    }
}

/// Turn completion JSON into a validated extraction.
pub fn interpret(
    json: &Map<String, Value>,
    message: &str,
    existing: Option<&CandidateContext>,
    catalog: &Catalog,
) -> Extraction {
    let intent = match json.get("intent").and_then(Value::as_str).map(str::to_lowercase) {
        Some(i) if i == "greeting" => Intent::Greeting,
        Some(i) if i == "off_topic" || i == "off-topic" || i == "offtopic" => Intent::OffTopic,
        _ => Intent::Compensation,
    };
    let reply = json.get("reply").and_then(json_to_text);

    match intent {
        Intent::Greeting => {
            return Extraction::conversational(
                intent,
                reply.unwrap_or_else(|| GREETING_REPLY.to_string()),
            );
        }
        // The completion's own reply is not trusted for off-topic requests.
        Intent::OffTopic => return Extraction::conversational(intent, OFF_TOPIC_REPLY),
        Intent::Compensation => {}
    }

    let corrected: Vec<String> = json
        .get("corrected_fields")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .collect()
        })
        .unwrap_or_default();
    let allowed = |field: RequiredField| -> bool {
        existing.is_none_or(|ctx| !ctx.has_field(field))
            || corrected.iter().any(|c| c == field.key())
    };

    let mut patch = ContextPatch::default();
    let mut rejected = Vec::new();
    let text = |key: &str| json.get(key).filter(|v| !is_blank(v)).and_then(json_to_text);

    if let Some(title) = text(RequiredField::JobTitle.key()) {
        if allowed(RequiredField::JobTitle) {
            let canonical = catalog
                .canonical_title(&title)
                .map(str::to_string)
                .unwrap_or(title);
            patch.job_title = Some(canonical);
        }
    }

    parse_into(
        text(RequiredField::JobLevel.key()),
        allowed(RequiredField::JobLevel),
        &mut patch.job_level,
        &mut rejected,
        |s| s.parse::<JobLevel>(),
    );
    parse_into(
        text(RequiredField::Location.key()),
        allowed(RequiredField::Location),
        &mut patch.location,
        &mut rejected,
        |s| s.parse::<Location>(),
    );
    parse_into(
        text(RequiredField::JobFamily.key()),
        allowed(RequiredField::JobFamily),
        &mut patch.job_family,
        &mut rejected,
        |s| s.parse::<JobFamily>(),
    );
    parse_into(
        text(RequiredField::InterviewFeedback.key()),
        allowed(RequiredField::InterviewFeedback),
        &mut patch.interview_feedback,
        &mut rejected,
        |s| s.parse::<InterviewFeedback>(),
    );

    if let Some(p) = text("proficiency") {
        match p.parse::<Proficiency>() {
            Ok(p) => patch.proficiency = Some(p),
            Err(e) => debug!(error = %e, "Ignoring proficiency"),
        }
    }

    // Default the family from the roster when the title is known there.
    let has_family = patch.job_family.is_some() || existing.is_some_and(|c| c.job_family.is_some());
    if !has_family {
        let title = patch
            .job_title
            .as_deref()
            .or_else(|| existing.and_then(|c| c.job_title.as_deref()));
        if let Some(family) = title.and_then(|t| catalog.family_for(t)) {
            debug!(job_title = ?title, family = %family, "Job family defaulted from roster");
            patch.job_family = Some(family);
        }
    }

    if let Some(Value::Object(extra)) = json.get("additional_context") {
        patch.additional_context = additional_context(extra);
    }

    let candidate_id = text(RequiredField::CandidateId.key())
        .and_then(|id| extract_candidate_id(&id))
        .or_else(|| extract_candidate_id(message));

    Extraction {
        intent,
        candidate_id,
        patch,
        rejected,
        reply,
    }
}

fn parse_into<T: PartialEq>(
    raw: Option<String>,
    allowed: bool,
    slot: &mut Option<T>,
    rejected: &mut Vec<ParseFieldError>,
    parse: impl Fn(&str) -> Result<T, ParseFieldError>,
) {
    let Some(raw) = raw else { return };
    match parse(&raw) {
        Ok(value) if allowed => *slot = Some(value),
        Ok(_) => {}
        Err(e) => {
            debug!(error = %e, "Rejected extracted value");
            rejected.push(e);
        }
    }
}

/// Known keys get typed parsing; anything else is kept as text.
fn additional_context(extra: &Map<String, Value>) -> AdditionalContext {
    let mut out = AdditionalContext::default();
    for (key, value) in extra {
        if is_blank(value) {
            continue;
        }
        let key = key.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "counter_offer" | "competing_offer" => out.counter_offer = money_from_json(value),
            "current_salary" | "current_compensation" => out.current_salary = money_from_json(value),
            "signing_bonus_request" | "signing_bonus" => {
                out.signing_bonus_request = money_from_json(value)
            }
            "urgency" => out.urgency = json_to_text(value),
            "special_notes" => out.special_notes = json_to_text(value),
            "relocation_needed" | "relocation" => {
                out.relocation_needed = match value {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) => match s.trim().to_lowercase().as_str() {
                        "true" | "yes" | "y" => Some(true),
                        "false" | "no" | "n" => Some(false),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => {
                if let Some(text) = json_to_text(value) {
                    out.extra.insert(key, text);
                }
            }
        }
    }
    out
}

fn build_prompt(
    message: &str,
    existing: Option<&CandidateContext>,
    candidate_id: Option<&str>,
    history: &[MessageRecord],
    catalog: &Catalog,
) -> String {
    let mut current = Map::new();
    current.insert(
        "candidate_id".into(),
        candidate_id.map_or(Value::Null, |id| Value::String(id.to_string())),
    );
    for field in RequiredField::ALL.into_iter().skip(1) {
        let value = existing
            .and_then(|c| c.field_value(field))
            .map_or(Value::Null, Value::String);
        current.insert(field.key().into(), value);
    }
    let current = Value::Object(current).to_string();
    let additional = existing
        .map(|c| serde_json::to_string(&c.additional_context.entries()).unwrap_or_default())
        .unwrap_or_else(|| "{}".into());

    let mut history_text = String::new();
    for record in history {
        history_text.push_str(&format!("User: {}\nAssistant: {}\n", record.message, record.response));
    }
    if history_text.is_empty() {
        history_text.push_str("None");
    }

    let titles = if catalog.titles.is_empty() {
        "(unknown)".to_string()
    } else {
        catalog.titles.join(", ")
    };

    format!(
        r#"You extract structured data for a compensation recommendation assistant. You only handle compensation requests.

Classify the user's message as "greeting", "off_topic" or "compensation".

Required fields:
- candidate_id: CAND-XXX format
- job_title: prefer one of the known titles: {titles}
- job_level: P1, P2, P3, P4 or P5
- location: LAX, SEA, STL, DUB, SHA, SYD or SIN (LA/Los Angeles=LAX, Seattle=SEA, St. Louis=STL, Dublin=DUB, Shanghai=SHA, Sydney=SYD, Singapore=SIN)
- job_family: Engineering, Sales, Marketing, HR, Finance, Operations, Legal or Executive
- interview_feedback: Must Hire, Strong Hire or Hire

Also extract every other compensation-relevant fact into additional_context, for example counter_offer, current_salary, signing_bonus_request (numbers), urgency, special_notes (text), relocation_needed (boolean), or any other key.

Only report values stated in the user's message. Use null for anything not mentioned. If the user is changing a value already recorded, list that field name in corrected_fields. Never compute salaries.

Current record: {current}
Existing additional context: {additional}
Recent conversation:
{history_text}
User message: {message}

Respond with one JSON object:
{{"intent": "...", "candidate_id": null, "job_title": null, "job_level": null, "location": null, "job_family": null, "interview_feedback": null, "proficiency": null, "additional_context": {{}}, "corrected_fields": [], "reply": "short reply for greetings or off-topic messages, else null"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use chrono::Utc;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn catalog() -> Catalog {
        let mut c = Catalog {
            titles: vec!["Software Engineer".into(), "Account Executive".into()],
            ..Default::default()
        };
        c.families.insert("account executive".into(), JobFamily::Sales);
        c
    }

    #[test]
    fn fields_are_normalized() {
        let json = obj(json!({
            "intent": "compensation",
            "candidate_id": "cand-001",
            "job_title": "software engineer",
            "job_level": "p3",
            "location": "Seattle",
            "job_family": "engineering",
            "interview_feedback": "strong-hire",
            "additional_context": {"counter_offer": "$150k", "urgency": "offer expires Friday", "years_experience": 6}
        }));
        let ex = interpret(&json, "", None, &catalog());
        assert_eq!(ex.candidate_id.as_deref(), Some("CAND-001"));
        assert_eq!(ex.patch.job_title.as_deref(), Some("Software Engineer"));
        assert_eq!(ex.patch.job_level, Some(JobLevel::P3));
        assert_eq!(ex.patch.location, Some(Location::Sea));
        assert_eq!(ex.patch.interview_feedback, Some(InterviewFeedback::StrongHire));
        assert_eq!(ex.patch.additional_context.counter_offer, Some(150_000.0));
        assert_eq!(
            ex.patch.additional_context.extra.get("years_experience").map(String::as_str),
            Some("6")
        );
        assert!(ex.rejected.is_empty());
    }

    #[test]
    fn invalid_values_are_rejected_not_coerced() {
        let json = obj(json!({
            "intent": "compensation",
            "job_level": "P7",
            "interview_feedback": "No Hire",
            "location": "Paris"
        }));
        let ex = interpret(&json, "", None, &catalog());
        assert_eq!(ex.patch.job_level, None);
        assert_eq!(ex.patch.interview_feedback, None);
        assert_eq!(ex.patch.location, None);
        let fields: Vec<RequiredField> = ex.rejected.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![RequiredField::JobLevel, RequiredField::Location, RequiredField::InterviewFeedback]
        );
    }

    #[test]
    fn existing_fields_change_only_when_corrected() {
        let mut ctx = CandidateContext::new("CAND-1", "a", Utc::now());
        ctx.location = Some(Location::Lax);
        ctx.job_level = Some(JobLevel::P2);

        let json = obj(json!({"intent": "compensation", "location": "SEA", "job_level": "P3"}));
        let ex = interpret(&json, "", Some(&ctx), &catalog());
        assert_eq!(ex.patch.location, None);
        assert_eq!(ex.patch.job_level, None);

        let json = obj(json!({
            "intent": "compensation",
            "location": "SEA",
            "job_level": "P3",
            "corrected_fields": ["location"]
        }));
        let ex = interpret(&json, "", Some(&ctx), &catalog());
        assert_eq!(ex.patch.location, Some(Location::Sea));
        assert_eq!(ex.patch.job_level, None);
    }

    #[test]
    fn family_defaults_from_roster() {
        let json = obj(json!({"intent": "compensation", "job_title": "account executive"}));
        let ex = interpret(&json, "", None, &catalog());
        assert_eq!(ex.patch.job_title.as_deref(), Some("Account Executive"));
        assert_eq!(ex.patch.job_family, Some(JobFamily::Sales));
    }

    #[test]
    fn off_topic_uses_fixed_reply() {
        let json = obj(json!({"intent": "off_topic", "reply": "Sure, here's a joke", "job_level": "P3"}));
        let ex = interpret(&json, "", None, &catalog());
        assert_eq!(ex.intent, Intent::OffTopic);
        assert_eq!(ex.reply.as_deref(), Some(OFF_TOPIC_REPLY));
        assert!(ex.patch.is_empty());
    }

    #[test]
    fn greetings_are_detected() {
        assert!(is_greeting("Hello!"));
        assert!(is_greeting("  good morning "));
        assert!(!is_greeting("hello, CAND-1 is a P3"));
    }

    #[tokio::test]
    async fn greeting_skips_the_provider() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let extractor = FieldExtractor::new(provider.clone(), "mock-model");
        let ex = extractor
            .extract("hi", None, None, &[], &Catalog::default())
            .await
            .unwrap();
        assert_eq!(ex.intent, Intent::Greeting);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn prose_wrapped_json_is_parsed() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "Got it!\n{\"intent\": \"compensation\", \"location\": \"Dublin\"}",
        ]));
        let extractor = FieldExtractor::new(provider, "mock-model");
        let ex = extractor
            .extract("based in Dublin", None, Some("CAND-1"), &[], &Catalog::default())
            .await
            .unwrap();
        assert_eq!(ex.patch.location, Some(Location::Dub));
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_unavailable() {
        let provider = Arc::new(SequentialMockProvider::failing());
        let extractor = FieldExtractor::new(provider, "mock-model");
        let err = extractor
            .extract("P3 in SEA", None, Some("CAND-1"), &[], &Catalog::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::UpstreamUnavailable(_)));
    }
}
