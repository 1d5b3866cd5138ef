//! The per-turn pipeline.
//!
//! A turn is a linear state machine:
//!
//! ```text
//! collecting ──► ready ──► computing ──► validating ──► done
//!      │                       │                          ▲
//!      └───────────────────────┴──────────────────────────┘
//!                 (question, reply, or no validator)
//! any state ──► error
//! ```
//!
//! Field updates are committed as soon as they are extracted. The lookup
//! cache and the recommendation snapshot are committed together, and only
//! after a recommendation was produced, so a failed turn never leaves a
//! partial write behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use compagent_config::AppConfig;
use compagent_core::candidate::{CandidateContext, ContextPatch, ParseFieldError, RequiredField};
use compagent_core::error::{Error, LookupError, TurnError};
use compagent_core::event::{DomainEvent, EventBus};
use compagent_core::lookup::{Catalog, LookupProvider};
use compagent_core::provider::Provider;
use compagent_core::recommendation::{GuardrailFlag, Recommendation, RecommendationSnapshot};
use compagent_core::store::ContextStore;
use compagent_core::user::User;
use compagent_data::CsvLookup;
use compagent_store::{MessageRecord, MessageStore, UserContextStore};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::commands::{SlashCommand, ensure_permitted};
use crate::engine::{EnginePolicy, RecommendationEngine};
use crate::extractor::{FieldExtractor, Intent};
use crate::normalize::extract_candidate_id;
use crate::render::recommendation_text;
use crate::stream_event::{TurnEvent, TurnResponse};
use crate::validator::Validator;

// ── Turn state ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Gathering required fields.
    Collecting,
    /// Every required field is known.
    Ready,
    /// Looking up rows and applying the rules.
    Computing,
    /// Checking the result against the rows.
    Validating,
    Done,
    Error,
}

impl TurnState {
    /// Whether `next` is a legal transition from `self`.
    pub fn can_advance_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Done | Error, _) => false,
            (_, Error) => true,
            (Collecting, Ready | Done) => true,
            (Ready, Computing) => true,
            (Computing, Validating | Done) => true,
            (Validating, Done) => true,
            _ => false,
        }
    }
}

struct Turn {
    state: TurnState,
}

impl Turn {
    fn new() -> Self {
        Self {
            state: TurnState::Collecting,
        }
    }

    fn advance(&mut self, next: TurnState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal turn transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Turn state");
        self.state = next;
    }
}

// ── Requests and outcomes ─────────────────────────────────────────────────

/// One user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    /// Candidate the client has selected, if any.
    pub candidate_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    pub user: User,
}

impl TurnRequest {
    pub fn new(user: User, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            candidate_id: None,
            session_id: None,
            request_id: None,
            user,
        }
    }

    pub fn with_candidate(mut self, candidate_id: impl Into<String>) -> Self {
        self.candidate_id = Some(candidate_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Default)]
struct TurnOutcome {
    content: String,
    recommendation: Option<Recommendation>,
    history: Vec<RecommendationSnapshot>,
    missing_field: Option<RequiredField>,
    /// Commands manage the user's selection themselves, and conversational
    /// replies leave it alone.
    keep_selection: bool,
}

/// One line per value the extractor could not use, ready to prefix a reply.
fn rejected_notes(rejected: &[ParseFieldError]) -> String {
    rejected
        .iter()
        .map(|r| format!("I couldn't use that value: {r}.\n\n"))
        .collect()
}

impl TurnOutcome {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

// ── Assistant ─────────────────────────────────────────────────────────────

/// Everything a turn needs, shared across requests.
pub struct Assistant {
    extractor: FieldExtractor,
    engine: RecommendationEngine,
    validator: Option<Validator>,
    lookup: Arc<dyn LookupProvider>,
    store: Arc<dyn ContextStore>,
    users: UserContextStore,
    messages: MessageStore,
    events: Arc<EventBus>,
    history_window: usize,
    lookup_timeout: Duration,
}

impl Assistant {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        lookup: Arc<dyn LookupProvider>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        Self::new_with(FieldExtractor::new(provider, model), lookup, store)
    }

    /// Wire every collaborator from configuration: provider chain, CSV
    /// tables, and the configured store backend.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let provider = compagent_providers::build_chain(config);
        let lookup: Arc<dyn LookupProvider> = Arc::new(CsvLookup::new(
            config.data.comp_ranges_path(),
            config.data.employee_roster_path(),
        ));
        let store = compagent_store::open_context_store(
            &config.store.backend,
            &config.store.dir,
            config.store.context_retention_days,
        )?;
        let (users, messages) = if config.store.backend == "memory" {
            (UserContextStore::new(), MessageStore::new())
        } else {
            (
                UserContextStore::open(&config.store.dir),
                MessageStore::open(&config.store.dir),
            )
        };

        let agent = &config.agent;
        let policy = EnginePolicy::from(agent);
        let extractor = FieldExtractor::new(provider, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_timeout(Duration::from_secs(agent.llm_timeout_secs));

        info!(
            provider = %config.default_provider,
            model = %config.default_model,
            store = %store.name(),
            validator = agent.enable_validator,
            "Assistant configured"
        );

        Ok(Self::new_with(extractor, lookup, store)
            .with_policy(policy)
            .with_validator(agent.enable_validator)
            .with_lookup_timeout(Duration::from_secs(agent.lookup_timeout_secs))
            .with_history_window(agent.history_window)
            .with_users(users)
            .with_messages(messages))
    }

    fn new_with(
        extractor: FieldExtractor,
        lookup: Arc<dyn LookupProvider>,
        store: Arc<dyn ContextStore>,
    ) -> Self {
        let policy = EnginePolicy::default();
        Self {
            extractor,
            engine: RecommendationEngine::new(lookup.clone()).with_policy(policy.clone()),
            validator: Some(Validator::new(policy)),
            lookup,
            store,
            users: UserContextStore::new(),
            messages: MessageStore::new(),
            events: Arc::new(EventBus::default()),
            history_window: 5,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_policy(mut self, policy: EnginePolicy) -> Self {
        self.engine = RecommendationEngine::new(self.lookup.clone())
            .with_policy(policy.clone())
            .with_lookup_timeout(self.lookup_timeout);
        if self.validator.is_some() {
            self.validator = Some(Validator::new(policy));
        }
        self
    }

    pub fn with_validator(mut self, enabled: bool) -> Self {
        self.validator = enabled.then(|| Validator::new(self.engine.policy().clone()));
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self.engine = RecommendationEngine::new(self.lookup.clone())
            .with_policy(self.engine.policy().clone())
            .with_lookup_timeout(timeout);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_users(mut self, users: UserContextStore) -> Self {
        self.users = users;
        self
    }

    pub fn with_messages(mut self, messages: MessageStore) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    pub fn users(&self) -> &UserContextStore {
        &self.users
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn lookup(&self) -> &Arc<dyn LookupProvider> {
        &self.lookup
    }

    /// Run a turn to completion.
    pub async fn handle(&self, request: TurnRequest) -> TurnResponse {
        self.run_turn(request, None).await
    }

    /// Run a turn on a background task, streaming its events. The turn
    /// completes and persists even if the receiver is dropped.
    pub fn stream(self: Arc<Self>, request: TurnRequest) -> mpsc::Receiver<TurnEvent> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let response = self.run_turn(request, Some(&tx)).await;
            let _ = tx.send(TurnEvent::from_response(response)).await;
        });
        rx
    }

    /// Run a turn, sending progress events to `tx` when given. Every error
    /// is converted into the returned response.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) -> TurnResponse {
        let started = Instant::now();
        let mut turn = Turn::new();
        let mut candidate_id: Option<String> = None;

        let result = self
            .process(&request, &mut turn, &mut candidate_id, tx)
            .await;
        let user = &request.user.email;

        let (outcome, error_kind) = match result {
            Ok(outcome) => (outcome, None),
            Err(err) => {
                turn.advance(TurnState::Error);
                match &err {
                    TurnError::UpstreamUnavailable(_) | TurnError::Store(_) => error!(
                        user = %user,
                        candidate_id = ?candidate_id,
                        kind = err.kind(),
                        error = %err,
                        "Turn failed"
                    ),
                    _ => warn!(
                        user = %user,
                        candidate_id = ?candidate_id,
                        kind = err.kind(),
                        error = %err,
                        "Turn ended with an error"
                    ),
                }
                self.events.publish(DomainEvent::ErrorOccurred {
                    context: format!("turn:{}", err.kind()),
                    error_message: err.to_string(),
                    timestamp: Utc::now(),
                });
                (TurnOutcome::text(err.user_message()), Some(err.kind().to_string()))
            }
        };

        if error_kind.is_none() && !outcome.keep_selection {
            if let Some(id) = &candidate_id {
                if let Err(e) = self.users.set_current(user, Some(id.clone())).await {
                    warn!(user = %user, error = %e, "Failed to store current candidate");
                }
            }
        }

        let record = MessageRecord::new(&request.message, &outcome.content)
            .with_candidate(candidate_id.clone())
            .with_session(request.session_id.clone())
            .with_request(request.request_id.clone());
        let response_id = record.id.clone();
        if let Err(e) = self.messages.save(user, record).await {
            warn!(user = %user, error = %e, "Failed to store message history");
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.publish(DomainEvent::TurnCompleted {
            candidate_id: candidate_id.clone(),
            user: user.clone(),
            outcome: error_kind.clone().unwrap_or_else(|| format!("{:?}", turn.state).to_lowercase()),
            duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            user = %user,
            candidate_id = ?candidate_id,
            state = ?turn.state,
            duration_ms,
            "Turn complete"
        );

        TurnResponse {
            content: outcome.content,
            candidate_id,
            recommendation: outcome.recommendation,
            response_id,
            history: outcome.history,
            state: turn.state,
            missing_field: outcome.missing_field,
            error: error_kind,
        }
    }

    async fn process(
        &self,
        request: &TurnRequest,
        turn: &mut Turn,
        candidate_id: &mut Option<String>,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<TurnOutcome, TurnError> {
        let user = &request.user;

        // Commands bypass extraction entirely.
        if let Some(command) = SlashCommand::parse(&request.message) {
            let command = command?;
            let current = match self.users.current(&user.email).await {
                Some(id) => Some(id),
                None => request.candidate_id.as_deref().and_then(extract_candidate_id),
            };
            emit(tx, "command", "Running command").await;
            let outcome = command
                .execute(self.store.as_ref(), &self.users, user, current)
                .await?;
            *candidate_id = outcome.candidate_id;
            turn.advance(TurnState::Done);
            return Ok(TurnOutcome {
                content: outcome.content,
                keep_selection: true,
                ..Default::default()
            });
        }

        let mut context = match self.resolve_candidate(request).await? {
            Some((id, ctx)) => {
                ensure_permitted(user, ctx.as_ref(), &id)?;
                *candidate_id = Some(id);
                ctx
            }
            None => None,
        };

        emit(tx, "extracting", "Reading your message").await;
        let history = self.recent_history(&user.email, candidate_id.as_deref()).await;
        let catalog = self.catalog().await;
        let extraction = self
            .extractor
            .extract(
                &request.message,
                context.as_ref(),
                candidate_id.as_deref(),
                &history,
                &catalog,
            )
            .await?;

        if extraction.intent != Intent::Compensation {
            debug!(intent = ?extraction.intent, "Conversational reply");
            *candidate_id = self.users.current(&user.email).await;
            turn.advance(TurnState::Done);
            return Ok(TurnOutcome {
                content: extraction.reply.unwrap_or_default(),
                keep_selection: true,
                ..Default::default()
            });
        }

        // The completion may have spotted an id the pattern missed.
        if candidate_id.is_none() {
            if let Some(id) = extraction.candidate_id.clone() {
                let ctx = self.explicit_candidate(&id).await?;
                ensure_permitted(user, ctx.as_ref(), &id)?;
                context = ctx;
                *candidate_id = Some(id);
            }
        }
        let Some(id) = candidate_id.clone() else {
            let mut outcome = TurnOutcome::text(RequiredField::CandidateId.question());
            outcome.missing_field = Some(RequiredField::CandidateId);
            return Ok(outcome);
        };

        // Explicit field updates are committed even if the recommendation
        // later fails; a missing record is created here.
        let patch = extraction.patch;
        if !patch.is_empty() || context.is_none() {
            let updated = self.store.apply(&id, &patch, &user.email).await?;
            let fields = patched_fields(&patch);
            if !fields.is_empty() {
                info!(candidate_id = %id, user = %user.email, fields = ?fields, "Context updated");
                self.events.publish(DomainEvent::ContextUpdated {
                    candidate_id: id.clone(),
                    user: user.email.clone(),
                    fields,
                    timestamp: Utc::now(),
                });
            }
            context = Some(updated);
        }
        let Some(context) = context else {
            return Err(TurnError::Command(format!("No candidate found with ID {id}.")));
        };

        if let Some(field) = context.next_missing() {
            let mut content = rejected_notes(&extraction.rejected);
            content.push_str(field.question());
            debug!(candidate_id = %id, field = %field, "Asking for missing field");
            return Ok(TurnOutcome {
                content,
                missing_field: Some(field),
                ..Default::default()
            });
        }

        turn.advance(TurnState::Ready);
        turn.advance(TurnState::Computing);
        emit(tx, "computing", "Looking up compensation data").await;
        let outcome = self.engine.recommend(&context).await?;
        let mut recommendation = outcome.recommendation;

        if let Some(validator) = &self.validator {
            turn.advance(TurnState::Validating);
            emit(tx, "validating", "Checking the recommendation").await;
            let report = validator.validate(&recommendation, &outcome.lookup, &outcome.input);
            if !report.passed {
                warn!(
                    candidate_id = %id,
                    problems = ?report.problems,
                    "Recommendation failed validation"
                );
                recommendation.flag(GuardrailFlag::ValidationFailed);
            }
            recommendation.validation = Some(report);
        }

        let snapshot = RecommendationSnapshot {
            timestamp: Utc::now(),
            created_by: user.email.clone(),
            fields: outcome.input.fields.clone(),
            additional_context: outcome.input.additional.clone(),
            recommendation: recommendation.clone(),
        };
        let commit = ContextPatch {
            cached_lookup: outcome.cache.fetched().then(|| outcome.lookup.clone()),
            recommendation: Some(snapshot),
            ..Default::default()
        };
        let updated = self.store.apply(&id, &commit, &user.email).await?;

        self.events.publish(DomainEvent::RecommendationProduced {
            candidate_id: id.clone(),
            total_compensation: recommendation.total_compensation,
            currency: recommendation.currency.clone(),
            needs_review: recommendation.needs_review(),
            timestamp: Utc::now(),
        });
        info!(
            candidate_id = %id,
            base_salary = recommendation.base_salary,
            total = recommendation.total_compensation,
            cache = ?outcome.cache,
            flags = ?recommendation.guardrail_flags,
            "Recommendation produced"
        );

        turn.advance(TurnState::Done);
        let mut history = updated.recommendation_history;
        history.reverse();
        let mut content = rejected_notes(&extraction.rejected);
        content.push_str(&recommendation_text(&outcome.input.fields, &recommendation));
        Ok(TurnOutcome {
            content,
            recommendation: Some(recommendation),
            history,
            ..Default::default()
        })
    }

    /// Resolution order: id in the message, the request's id, the user's
    /// current candidate, then the most recent candidate in their history.
    async fn resolve_candidate(
        &self,
        request: &TurnRequest,
    ) -> Result<Option<(String, Option<CandidateContext>)>, TurnError> {
        let explicit = extract_candidate_id(&request.message).or_else(|| {
            request
                .candidate_id
                .as_deref()
                .and_then(extract_candidate_id)
        });
        if let Some(id) = explicit {
            let ctx = self.explicit_candidate(&id).await?;
            return Ok(Some((id, ctx)));
        }

        let email = &request.user.email;
        if let Some(id) = self.users.current(email).await {
            match self.store.get(&id).await? {
                Some(ctx) if !ctx.is_open() => {
                    debug!(candidate_id = %id, "Current candidate is closed, not selecting it");
                }
                ctx => return Ok(Some((id, ctx))),
            }
        }

        for id in self.messages.recent_candidate_ids(email).await {
            if let Some(ctx) = self.store.get(&id).await? {
                if ctx.is_open() {
                    debug!(candidate_id = %id, "Resumed candidate from message history");
                    return Ok(Some((id, Some(ctx))));
                }
            }
        }
        Ok(None)
    }

    /// A candidate the user named. Closed candidates must be reopened first.
    async fn explicit_candidate(&self, id: &str) -> Result<Option<CandidateContext>, TurnError> {
        let ctx = self.store.get(id).await?;
        if let Some(ctx) = &ctx {
            if !ctx.is_open() {
                return Err(TurnError::Command(format!(
                    "{id} is closed. Use /reopen {id} to work on it again."
                )));
            }
        }
        Ok(ctx)
    }

    /// The last exchanges about this candidate, oldest first.
    async fn recent_history(&self, user: &str, candidate_id: Option<&str>) -> Vec<MessageRecord> {
        let mut history = self
            .messages
            .get_messages(user, candidate_id, self.history_window, 0)
            .await;
        history.reverse();
        history
    }

    /// Known titles and families. Extraction still works without them.
    async fn catalog(&self) -> Catalog {
        let result = match tokio::time::timeout(self.lookup_timeout, self.lookup.catalog()).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout.as_secs())),
        };
        result.unwrap_or_else(|e| {
            warn!(lookup = %self.lookup.name(), error = %e, "Catalog unavailable");
            Catalog::default()
        })
    }
}

async fn emit(tx: Option<&mpsc::Sender<TurnEvent>>, step: &str, message: &str) {
    if let Some(tx) = tx {
        // A closed receiver only means the client stopped listening.
        let _ = tx.send(TurnEvent::processing(step, message)).await;
    }
}

fn patched_fields(patch: &ContextPatch) -> Vec<String> {
    let mut fields = Vec::new();
    let mut note = |set: bool, name: &str| {
        if set {
            fields.push(name.to_string());
        }
    };
    note(patch.job_title.is_some(), RequiredField::JobTitle.key());
    note(patch.job_level.is_some(), RequiredField::JobLevel.key());
    note(patch.location.is_some(), RequiredField::Location.key());
    note(patch.job_family.is_some(), RequiredField::JobFamily.key());
    note(
        patch.interview_feedback.is_some(),
        RequiredField::InterviewFeedback.key(),
    );
    note(patch.proficiency.is_some(), "proficiency");
    fields.extend(patch.additional_context.entries().into_keys());
    fields
}
