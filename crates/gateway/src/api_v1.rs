//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/login`  Exchange credentials for a bearer token
//! - `POST /v1/chat`  Run a turn, get the final payload
//! - `POST /v1/chat/stream`  Run a turn, get SSE `processing` + `response`/`error`
//! - `GET  /v1/context/{id}`  A candidate's record
//! - `POST /v1/context/reset`  Delete a candidate's record (Comp Team)
//! - `GET  /v1/audit/{id}`  A candidate's audit log
//! - `GET  /v1/candidates?state=`  Active or closed candidates
//! - `GET  /v1/user/current-candidate`  The caller's selected candidate
//! - `GET  /v1/messages`  The caller's message history
//! - `POST /v1/feedback`  Thumbs-down / report-error on a response
//! - `GET  /v1/events`  SSE stream of domain events (Comp Team)

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{error, info};

use compagent_agent::commands::ensure_permitted;
use compagent_agent::normalize::extract_candidate_id;
use compagent_agent::{TurnRequest, TurnResponse};
use compagent_core::audit::AuditEntry;
use compagent_core::candidate::{CandidateContext, CandidateStatus};
use compagent_core::error::{StoreError, TurnError};
use compagent_core::event::DomainEvent;
use compagent_core::user::{User, UserType};
use compagent_store::{FeedbackKind, MessageRecord};

use crate::{SharedState, auth_middleware};

const MAX_PAGE: usize = 200;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/context/{id}", get(get_context_handler))
        .route("/context/reset", post(reset_context_handler))
        .route("/audit/{id}", get(audit_handler))
        .route("/candidates", get(list_candidates_handler))
        .route("/user/current-candidate", get(current_candidate_handler))
        .route("/messages", get(messages_handler))
        .route("/feedback", post(feedback_handler))
        .route("/events", get(event_stream_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/login", post(login_handler))
        .merge(protected)
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
    pub user_type: UserType,
    pub display_name: Option<String>,
    pub current_candidate: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    candidate_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

impl ChatRequest {
    fn into_turn(self, user: User) -> Result<TurnRequest, (StatusCode, Json<ErrorResponse>)> {
        if self.message.trim().is_empty() {
            return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
        }
        Ok(TurnRequest {
            message: self.message,
            candidate_id: self.candidate_id,
            session_id: self.session_id,
            request_id: self.request_id,
            user,
        })
    }
}

#[derive(Deserialize)]
struct ResetRequest {
    candidate_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct ResetResponse {
    pub candidate_id: String,
    pub reset: bool,
}

#[derive(Serialize, Deserialize)]
pub struct AuditResponse {
    pub candidate_id: String,
    pub entries: Vec<AuditEntry>,
}

#[derive(Deserialize)]
struct CandidatesQuery {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CandidateSummary {
    pub candidate_id: String,
    pub job_title: Option<String>,
    pub job_level: Option<String>,
    pub location: Option<String>,
    pub status: CandidateStatus,
    pub recommendations: usize,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl From<&CandidateContext> for CandidateSummary {
    fn from(ctx: &CandidateContext) -> Self {
        Self {
            candidate_id: ctx.candidate_id.clone(),
            job_title: ctx.job_title.clone(),
            job_level: ctx.job_level.map(|l| l.to_string()),
            location: ctx.location.map(|l| l.to_string()),
            status: ctx.status,
            recommendations: ctx.recommendation_history.len(),
            updated_at: ctx.updated_at,
            updated_by: ctx.updated_by.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct CandidateListResponse {
    pub state: String,
    pub candidates: Vec<CandidateSummary>,
}

#[derive(Serialize, Deserialize)]
pub struct CurrentCandidateResponse {
    pub candidate_id: Option<String>,
}

#[derive(Deserialize)]
struct MessagesQuery {
    #[serde(default)]
    candidate_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    response_id: String,
    feedback_type: String,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub status: String,
    pub response_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    error!(error = %e, "Store failure while serving API request");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
}

fn parse_candidate_id(raw: &str) -> Result<String, ApiError> {
    extract_candidate_id(raw).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("'{raw}' is not a candidate ID (expected CAND-XXX)"),
        )
    })
}

/// Load a record the caller may see.
async fn visible_context(
    state: &SharedState,
    user: &User,
    candidate_id: &str,
) -> Result<Option<CandidateContext>, ApiError> {
    let ctx = state
        .assistant
        .store()
        .get(candidate_id)
        .await
        .map_err(store_error)?;
    match ensure_permitted(user, ctx.as_ref(), candidate_id) {
        Ok(()) => Ok(ctx),
        Err(TurnError::NotPermitted(reason)) => Err(api_error(StatusCode::FORBIDDEN, reason)),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn login_handler(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Some((token, session)) = state.login(&payload.email, &payload.password).await else {
        info!(email = %payload.email, "Login rejected");
        return Err(api_error(StatusCode::UNAUTHORIZED, "invalid email or password"));
    };
    let current_candidate = state.assistant.users().current(&session.user.email).await;
    info!(email = %session.user.email, user_type = %session.user.user_type, "Login");

    Ok(Json(LoginResponse {
        token,
        email: session.user.email,
        user_type: session.user.user_type,
        display_name: session.display_name,
        current_candidate,
        expires_at: session.expires_at,
    }))
}

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    info!(user = %user.email, "v1/chat request");
    let request = payload.into_turn(user)?;
    Ok(Json(state.assistant.handle(request).await))
}

async fn chat_stream_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(user = %user.email, "v1/chat/stream SSE request");
    let request = payload.into_turn(user)?;
    let rx = state.assistant.clone().stream(request);

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn get_context_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<CandidateContext>, ApiError> {
    let id = parse_candidate_id(&id)?;
    visible_context(&state, &user, &id)
        .await?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No candidate found with ID {id}")))
}

async fn reset_context_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    if !user.user_type.can_reset() {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Only the Compensation Team can reset a candidate's context",
        ));
    }
    let id = parse_candidate_id(&payload.candidate_id)?;

    let existed = state
        .assistant
        .store()
        .reset(&id, &user.email)
        .await
        .map_err(store_error)?;
    if !existed {
        return Err(api_error(StatusCode::NOT_FOUND, format!("No candidate found with ID {id}")));
    }
    state
        .assistant
        .users()
        .forget_candidate(&id)
        .await
        .map_err(store_error)?;
    info!(candidate_id = %id, user = %user.email, "Context reset");

    Ok(Json(ResetResponse {
        candidate_id: id,
        reset: true,
    }))
}

async fn audit_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<AuditResponse>, ApiError> {
    let id = parse_candidate_id(&id)?;
    if user.user_type.requires_history() {
        visible_context(&state, &user, &id).await?;
    }
    let entries = state
        .assistant
        .store()
        .audit_log(&id)
        .await
        .map_err(store_error)?;
    Ok(Json(AuditResponse {
        candidate_id: id,
        entries,
    }))
}

async fn list_candidates_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Query(query): Query<CandidatesQuery>,
) -> Result<Json<CandidateListResponse>, ApiError> {
    let which = query.state.unwrap_or_else(|| "active".into()).to_lowercase();
    let store = state.assistant.store();
    let records = match which.as_str() {
        "active" => store.list_active(&user.email).await,
        "closed" => store.list_closed().await,
        other => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown state '{other}' (expected active or closed)"),
            ));
        }
    }
    .map_err(store_error)?;

    let candidates = records
        .iter()
        .filter(|c| !user.user_type.requires_history() || !c.recommendation_history.is_empty())
        .map(CandidateSummary::from)
        .collect();
    Ok(Json(CandidateListResponse {
        state: which,
        candidates,
    }))
}

async fn current_candidate_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Json<CurrentCandidateResponse> {
    Json(CurrentCandidateResponse {
        candidate_id: state.assistant.users().current(&user.email).await,
    })
}

async fn messages_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let candidate = match query.candidate_id.as_deref() {
        Some(raw) => Some(parse_candidate_id(raw)?),
        None => None,
    };
    let limit = query.limit.clamp(1, MAX_PAGE);
    let messages = state.assistant.messages();
    let page = messages
        .get_messages(&user.email, candidate.as_deref(), limit, query.offset)
        .await;
    let total = messages.count(&user.email, candidate.as_deref()).await;

    Ok(Json(MessagesResponse {
        messages: page,
        total,
        limit,
        offset: query.offset,
    }))
}

async fn feedback_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let kind: FeedbackKind = payload.feedback_type.parse().map_err(|_| {
        api_error(
            StatusCode::BAD_REQUEST,
            "feedback_type must be thumbs_down or report_error",
        )
    })?;

    let found = state
        .assistant
        .messages()
        .record_feedback(&user.email, &payload.response_id, kind)
        .await
        .map_err(store_error)?;
    if !found {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No response found with ID {}", payload.response_id),
        ));
    }

    info!(
        response_id = %payload.response_id,
        feedback_type = kind.as_str(),
        user = %user.email,
        comment = payload.comment.as_deref().unwrap_or(""),
        "Feedback submitted"
    );
    state.assistant.events().publish(DomainEvent::FeedbackSubmitted {
        response_id: payload.response_id.clone(),
        feedback_type: kind.as_str().to_string(),
        user: user.email.clone(),
        timestamp: Utc::now(),
    });

    Ok(Json(FeedbackResponse {
        status: "recorded".into(),
        response_id: payload.response_id,
    }))
}

async fn event_stream_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if user.user_type != UserType::CompTeam {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "The event stream is available to the Compensation Team only",
        ));
    }
    let rx = state.assistant.events().subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.name()).data(data))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Tests ─────────────────────────────────────────────────────────────────
