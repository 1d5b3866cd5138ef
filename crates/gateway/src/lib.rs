//! HTTP API gateway for CompAgent.
//!
//! Exposes the assistant over REST and SSE: login, chat turns, candidate
//! context and audit views, message history, and response feedback.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::Next,
    response::Json,
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use compagent_agent::Assistant;
use compagent_config::{AppConfig, UserConfig};
use compagent_core::user::User;

/// Maximum number of live sessions before the oldest is evicted.
const MAX_SESSIONS: usize = 1_000;

const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Shared application state for the gateway.
pub struct GatewayState {
    pub assistant: Arc<Assistant>,
    pub users: Vec<UserConfig>,
    pub token_ttl: Duration,
    /// Bearer token to session.
    pub sessions: RwLock<HashMap<String, Session>>,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(assistant: Arc<Assistant>, config: &AppConfig) -> Self {
        Self {
            assistant,
            users: config.users.clone(),
            token_ttl: Duration::hours(config.gateway.token_ttl_hours as i64),
            sessions: RwLock::new(HashMap::new()),
            start_time: Utc::now(),
        }
    }

    /// Check credentials and open a session. Returns the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Option<(String, Session)> {
        let account = self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))?;
        if !password_matches(&account.password_sha256, password) {
            return None;
        }

        let now = Utc::now();
        let session = Session {
            user: User::new(account.email.to_lowercase(), account.user_type),
            display_name: account.display_name.clone(),
            created_at: now,
            expires_at: now + self.token_ttl,
        };
        let token = uuid::Uuid::new_v4().to_string();

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);
        if sessions.len() >= MAX_SESSIONS {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.created_at)
                .map(|(k, _)| k.clone())
            {
                sessions.remove(&oldest);
            }
        }
        sessions.insert(token.clone(), session.clone());
        Some((token, session))
    }

    /// The user behind a live token.
    pub async fn authenticate(&self, token: &str) -> Option<User> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token)?;
        if session.expires_at <= Utc::now() {
            debug!("Rejected expired session token");
            return None;
        }
        Some(session.user.clone())
    }
}

/// Hex-encoded SHA-256, the format stored in `password_sha256`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compare a password against a stored hex digest in constant time.
/// A malformed stored digest never matches.
fn password_matches(stored_hex: &str, password: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hex.trim()) else {
        return false;
    };
    let digest = Sha256::digest(password.as_bytes());
    stored.as_slice().ct_eq(digest.as_slice()).into()
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on every /v1 route except login
/// - CORS limited to the configured origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState, allowed_origin: Option<&str>) -> Router {
    let origin = allowed_origin
        .and_then(|o| o.parse::<HeaderValue>().ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ORIGIN));
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let assistant = Arc::new(Assistant::from_config(&config)?);
    let state = Arc::new(GatewayState::new(assistant, &config));
    let app = build_router(state, config.gateway.allowed_origin.as_deref());

    info!(addr = %addr, users = config.users.len(), "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Requires a valid `Authorization: Bearer <token>` header and puts the
/// session's [`User`] into the request extensions.
pub(crate) async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let user = match token {
        Some(token) => state.authenticate(token).await,
        None => None,
    };
    match user {
        Some(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        None => {
            warn!(path = %req.uri().path(), "Unauthorized request to /v1 API: missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use compagent_core::user::UserType;
    use tower::ServiceExt;

    pub(crate) fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.users = vec![
            UserConfig {
                email: "comp@example.com".into(),
                display_name: Some("Comp".into()),
                password_sha256: hash_password("secret"),
                user_type: UserType::CompTeam,
            },
            UserConfig {
                email: "rec@example.com".into(),
                display_name: None,
                password_sha256: hash_password("secret"),
                user_type: UserType::RecruitmentTeam,
            },
        ];
        config
    }

    fn test_state() -> SharedState {
        let config = test_config();
        let assistant = Arc::new(api_v1::tests::test_assistant());
        Arc::new(GatewayState::new(assistant, &config))
    }

    #[test]
    fn password_hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stored_digest_comparison() {
        let stored = hash_password("secret");
        assert!(password_matches(&stored, "secret"));
        assert!(password_matches(&stored.to_uppercase(), "secret"));
        assert!(!password_matches(&stored, "Secret"));
        assert!(!password_matches(&stored[..10], "secret"));
        assert!(!password_matches("not-hex", "secret"));
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(), None);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn v1_requires_bearer_token() {
        let app = build_router(test_state(), None);

        let req = Request::builder()
            .uri("/v1/user/current-candidate")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_checks_password_and_case() {
        let state = test_state();
        assert!(state.login("comp@example.com", "wrong").await.is_none());
        assert!(state.login("nobody@example.com", "secret").await.is_none());

        let (token, session) = state.login("COMP@example.com", "secret").await.unwrap();
        assert_eq!(session.user.email, "comp@example.com");
        assert_eq!(
            state.authenticate(&token).await.map(|u| u.user_type),
            Some(UserType::CompTeam)
        );
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected() {
        let state = test_state();
        let (token, _) = state.login("rec@example.com", "secret").await.unwrap();
        state
            .sessions
            .write()
            .await
            .get_mut(&token)
            .unwrap()
            .expires_at = Utc::now() - Duration::seconds(1);
        assert!(state.authenticate(&token).await.is_none());
    }

    #[tokio::test]
    async fn authorized_request_passes() {
        let state = test_state();
        let (token, _) = state.login("comp@example.com", "secret").await.unwrap();
        let app = build_router(state, Some("https://comp.example.com"));

        let req = Request::builder()
            .uri("/v1/user/current-candidate")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
