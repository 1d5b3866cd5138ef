//! End-to-end integration tests for the CompAgent assistant.
//!
//! These tests exercise the full pipeline from a user message to a
//! recommendation: extraction with a scripted provider, CSV lookups,
//! the file-backed context store, and the HTTP gateway.

use std::sync::Arc;

use compagent_agent::{Assistant, TurnEvent, TurnRequest, TurnState};
use compagent_core::candidate::{CandidateStatus, JobLevel, Location, RequiredField};
use compagent_core::error::ProviderError;
use compagent_core::event::DomainEvent;
use compagent_core::message::Message;
use compagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use compagent_core::recommendation::{GuardrailFlag, RecommendationStatus};
use compagent_core::store::ContextStore;
use compagent_core::user::User;
use compagent_data::{CsvLookup, InMemoryLookup};
use compagent_store::{FileContextStore, InMemoryContextStore};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn texts(texts: &[&str]) -> Self {
        Self {
            responses: std::sync::Mutex::new(texts.iter().map(|t| text_response(t)).collect()),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let resp = responses[*count].clone();
        *count += 1;
        Ok(resp)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const COMP_RANGES: &str = "\
Job Title,Location,Currency,Min,Max
Software Engineer,SEA,USD,\"$120,000\",\"$180,000\"
Data Scientist,DUB,EUR,80000,120000
";

const ROSTER: &str = "\
Name,Job Title,Job Family,Proficiency,Location,Compensation
Employee 1,Software Engineer,Engineering,Advanced,SEA,\"$170,000\"
Employee 2,Software Engineer,Engineering,Intermediate,SEA,150000
";

const TITLE_LEVEL_FEEDBACK: &str = r#"{"intent": "compensation", "job_title": "software engineer",
    "job_level": "p3", "job_family": "Engineering", "interview_feedback": "strong hire"}"#;
const LOCATION_ONLY: &str = r#"{"intent": "compensation", "location": "Seattle"}"#;
const COUNTER_220K: &str =
    r#"{"intent": "compensation", "additional_context": {"counter_offer": "$220k"}}"#;

fn comp() -> User {
    User::comp_team("comp@example.com")
}

fn recruiter() -> User {
    User::recruiter("rec@example.com")
}

fn write_tables(dir: &std::path::Path) {
    std::fs::write(dir.join("CompRanges.csv"), COMP_RANGES).unwrap();
    std::fs::write(dir.join("EmployeeRoster.csv"), ROSTER).unwrap();
}

fn file_assistant(dir: &std::path::Path, provider: Arc<ScriptedProvider>) -> Assistant {
    let store = FileContextStore::open(&dir.join("store"), 60).expect("store should open");
    Assistant::new(
        provider,
        "mock-model",
        Arc::new(CsvLookup::in_dir(dir)),
        Arc::new(store),
    )
}

// ── E2E: Full conversation over CSV tables and the file store ────────────

#[tokio::test]
async fn e2e_collect_recommend_then_counter_offer() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let provider = Arc::new(ScriptedProvider::texts(&[
        TITLE_LEVEL_FEEDBACK,
        LOCATION_ONLY,
        COUNTER_220K,
    ]));
    let assistant = file_assistant(dir.path(), provider.clone());

    // Turn 1: location is missing, so the assistant asks for it.
    let first = assistant
        .handle(TurnRequest::new(comp(), "cand-007 is a P3 software engineer, strong hire"))
        .await;
    assert_eq!(first.candidate_id.as_deref(), Some("CAND-007"));
    assert_eq!(first.state, TurnState::Collecting);
    assert_eq!(first.missing_field, Some(RequiredField::Location));

    // Turn 2: the current candidate carries over and the record is complete.
    let second = assistant.handle(TurnRequest::new(comp(), "Seattle")).await;
    assert_eq!(second.state, TurnState::Done);
    let rec = second.recommendation.expect("recommendation");
    assert_eq!(rec.base_salary, 165_000.0);
    assert_eq!(rec.currency, "USD");
    assert_eq!(rec.status, RecommendationStatus::Approved);
    assert!(rec.validation.as_ref().is_some_and(|v| v.passed));

    // Turn 3: a counter offer above the range caps the base and boosts equity.
    let third = assistant
        .handle(TurnRequest::new(comp(), "they got a competing offer of $220k"))
        .await;
    let countered = third.recommendation.expect("recommendation");
    assert_eq!(countered.base_salary, 180_000.0);
    assert!(countered.has_flag(GuardrailFlag::CounterOfferExceedsMax));
    assert_eq!(countered.status, RecommendationStatus::NeedsReview);
    assert_eq!(countered.equity_amount - rec.equity_amount, 40_000.0);
    assert_eq!(third.history.len(), 2);
    assert_eq!(provider.calls(), 3);

    // Everything above survives a restart.
    let reopened = FileContextStore::open(&dir.path().join("store"), 60).unwrap();
    let ctx = reopened.get("CAND-007").await.unwrap().expect("persisted");
    assert_eq!(ctx.job_level, Some(JobLevel::P3));
    assert_eq!(ctx.location, Some(Location::Sea));
    assert_eq!(ctx.job_title.as_deref(), Some("Software Engineer"));
    assert_eq!(ctx.recommendation_history.len(), 2);
    assert!(ctx.cached_lookup.is_some());

    let audit = reopened.audit_log("CAND-007").await.unwrap();
    assert!(audit.iter().any(|e| e.field == "location" && e.new_value.as_deref() == Some("SEA")));
    assert!(audit.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

// ── E2E: Recruiter handoff ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_recruiter_follows_up_on_comp_team_candidate() {
    let full = r#"{"intent": "compensation", "job_title": "Software Engineer", "job_level": "P3",
        "location": "SEA", "job_family": "Engineering", "interview_feedback": "Hire"}"#;
    let provider = Arc::new(ScriptedProvider::texts(&[full, COUNTER_220K]));
    let lookup = InMemoryLookup::new()
        .with_market("Software Engineer", "SEA", "USD", 120_000.0, 180_000.0)
        .with_employee("A", "Software Engineer", Some("Engineering"), "Advanced", "SEA", 170_000.0);
    let assistant = Assistant::new(
        provider,
        "mock-model",
        Arc::new(lookup),
        Arc::new(InMemoryContextStore::default()),
    );

    // Before the Comp Team has produced anything, the recruiter is refused.
    let refused = assistant
        .handle(TurnRequest::new(recruiter(), "/switch CAND-010"))
        .await;
    assert!(refused.error.is_some());

    let made = assistant
        .handle(TurnRequest::new(comp(), "CAND-010, P3 SWE in Seattle, hire"))
        .await;
    assert_eq!(made.state, TurnState::Done);

    let follow_up = assistant
        .handle(TurnRequest::new(recruiter(), "CAND-010 has a counter offer of 220k"))
        .await;
    assert_eq!(follow_up.state, TurnState::Done);
    assert_eq!(follow_up.history.len(), 2);

    let audit = assistant.store().audit_log("CAND-010").await.unwrap();
    assert!(audit.iter().any(|e| e.user == "rec@example.com" && e.field == "additional_context.counter_offer"));
}

// ── E2E: Slash commands and candidate lifecycle ─────────────────────────

#[tokio::test]
async fn e2e_close_and_reopen_candidate() {
    let provider = Arc::new(ScriptedProvider::texts(&[]));
    let assistant = Assistant::new(
        provider.clone(),
        "mock-model",
        Arc::new(InMemoryLookup::new()),
        Arc::new(InMemoryContextStore::default()),
    );

    let created = assistant.handle(TurnRequest::new(comp(), "/new CAND-020")).await;
    assert_eq!(created.candidate_id.as_deref(), Some("CAND-020"));

    assistant.handle(TurnRequest::new(comp(), "/close")).await;
    let ctx = assistant.store().get("CAND-020").await.unwrap().unwrap();
    assert_eq!(ctx.status, CandidateStatus::Closed);
    assert!(ctx.closed_at.is_some());
    assert!(assistant.store().list_active("comp@example.com").await.unwrap().is_empty());

    let blocked = assistant.handle(TurnRequest::new(comp(), "CAND-020 is now a P4")).await;
    assert_eq!(blocked.error.as_deref(), Some("command_error"));
    assert!(blocked.content.contains("/reopen"));

    assistant.handle(TurnRequest::new(comp(), "/reopen CAND-020")).await;
    let ctx = assistant.store().get("CAND-020").await.unwrap().unwrap();
    assert_eq!(ctx.status, CandidateStatus::Open);

    // None of this reached the completion provider.
    assert_eq!(provider.calls(), 0);
}

// ── E2E: Streaming and domain events ────────────────────────────────────

#[tokio::test]
async fn e2e_stream_emits_progress_then_response_and_events() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let full = r#"{"intent": "compensation", "job_title": "Data Scientist", "job_level": "P2",
        "location": "Dublin", "job_family": "Engineering", "interview_feedback": "Hire"}"#;
    let assistant = Arc::new(file_assistant(
        dir.path(),
        Arc::new(ScriptedProvider::texts(&[full])),
    ));
    let mut events = assistant.events().subscribe();

    let mut rx = assistant
        .clone()
        .stream(TurnRequest::new(comp(), "CAND-030 data scientist in Dublin, P2, hire"));
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        seen.push(event);
    }

    assert!(matches!(seen.first(), Some(TurnEvent::Processing { .. })));
    match seen.last() {
        Some(TurnEvent::Response(response)) => {
            let rec = response.recommendation.as_ref().expect("recommendation");
            assert_eq!(rec.currency, "EUR");
            assert!(rec.base_salary >= 80_000.0 && rec.base_salary <= 120_000.0);
        }
        other => panic!("Expected a final response, got {:?}", other),
    }
    assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 1);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["context_updated", "recommendation_produced", "turn_completed"]
    );
}

#[tokio::test]
async fn e2e_missing_tables_are_reported_without_recommendation() {
    let dir = tempfile::tempdir().unwrap();
    let full = r#"{"intent": "compensation", "job_title": "Software Engineer", "job_level": "P3",
        "location": "SEA", "job_family": "Engineering", "interview_feedback": "Hire"}"#;
    let assistant = file_assistant(dir.path(), Arc::new(ScriptedProvider::texts(&[full])));
    let mut events = assistant.events().subscribe();

    let response = assistant
        .handle(TurnRequest::new(comp(), "CAND-040 P3 software engineer, Seattle, hire"))
        .await;
    assert_eq!(response.state, TurnState::Error);
    assert!(response.recommendation.is_none());

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::ErrorOccurred { .. } = event.as_ref() {
            saw_error = true;
        }
    }
    assert!(saw_error);
}

// ── E2E: Gateway API (router only, no server) ──────────────────────────

#[tokio::test]
async fn e2e_gateway_login_and_chat() {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let mut config = compagent_config::AppConfig::default();
    config.users = vec![compagent_config::UserConfig {
        email: "comp@example.com".into(),
        display_name: None,
        password_sha256: compagent_gateway::hash_password("secret"),
        user_type: compagent_core::user::UserType::CompTeam,
    }];
    let full = r#"{"intent": "compensation", "job_title": "Software Engineer", "job_level": "P3",
        "location": "SEA", "job_family": "Engineering", "interview_feedback": "Strong Hire"}"#;
    let lookup = InMemoryLookup::new()
        .with_market("Software Engineer", "SEA", "USD", 120_000.0, 180_000.0);
    let assistant = Arc::new(Assistant::new(
        Arc::new(ScriptedProvider::texts(&[full])),
        "mock-model",
        Arc::new(lookup),
        Arc::new(InMemoryContextStore::default()),
    ));
    let state = Arc::new(compagent_gateway::GatewayState::new(assistant, &config));
    let app = compagent_gateway::build_router(state, None);

    let login = Request::builder()
        .method("POST")
        .uri("/v1/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"email": "comp@example.com", "password": "secret"}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(login).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let login: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let token = login["token"].as_str().unwrap().to_string();

    let chat = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(
            serde_json::json!({"message": "CAND-050 P3 SWE Seattle strong hire"}).to_string(),
        ))
        .unwrap();
    let resp = app.clone().oneshot(chat).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let turn: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(turn["recommendation"]["base_salary"], 165_000.0);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(health).await.unwrap();
    assert_eq!(resp.status(), 200);
}

// ── E2E: Configuration System ───────────────────────────────────────────

#[tokio::test]
async fn e2e_config_defaults_and_roundtrip() {
    let config = compagent_config::AppConfig::default();

    assert!(!config.default_model.is_empty());
    assert_eq!(config.store.context_retention_days, 60);
    assert!(config.agent.enable_validator);
    assert!(config.gateway.port > 0);

    let toml_str = toml::to_string_pretty(&config).expect("Config should serialize");
    let reparsed: compagent_config::AppConfig =
        toml::from_str(&toml_str).expect("Config should parse back");

    assert_eq!(reparsed.default_model, config.default_model);
    assert_eq!(reparsed.gateway.port, config.gateway.port);
    assert_eq!(reparsed.users.len(), config.users.len());
}
