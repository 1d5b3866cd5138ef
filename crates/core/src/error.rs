//! Error types for the CompAgent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`TurnError`] is the
//! taxonomy surfaced at the conversational turn boundary.

use thiserror::Error;

use crate::candidate::RequiredField;

/// The top-level error type for all CompAgent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Lookup errors ---
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Turn errors ---
    #[error(transparent)]
    Turn(#[from] TurnError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("Table {table} could not be read: {reason}")]
    TableUnavailable { table: String, reason: String },

    #[error("Malformed row {line} in {table}: {reason}")]
    MalformedRow {
        table: String,
        line: u64,
        reason: String,
    },

    #[error("Lookup timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Failed to (de)serialize record: {0}")]
    Serialization(String),

    #[error("Candidate not found: {0}")]
    NotFound(String),
}

/// Errors raised while processing one conversational turn.
///
/// Every variant is recoverable: the pipeline converts it into a user-visible
/// message plus a log entry, and the session continues.
#[derive(Debug, Error)]
pub enum TurnError {
    /// A required field is still unset. Surfaced as a clarifying question.
    #[error("Missing required field: {}", .0.key())]
    MissingField(RequiredField),

    /// The market table has no row for the requested key.
    #[error("No market data for '{job_title}' in {location}")]
    NoDataFound { job_title: String, location: String },

    /// The validator rejected a computed recommendation.
    #[error("Recommendation failed validation: {}", .0.join("; "))]
    ValidationFailure(Vec<String>),

    /// The text-completion or lookup capability failed or timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A slash command was malformed or could not be applied.
    #[error("Command failed: {0}")]
    Command(String),

    /// The user's role does not allow this action.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl TurnError {
    /// Short machine-readable kind, used in logs and the error event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::NoDataFound { .. } => "no_data_found",
            Self::ValidationFailure(_) => "validation_failure",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Command(_) => "command_error",
            Self::NotPermitted(_) => "not_permitted",
            Self::Store(_) => "store_error",
        }
    }

    /// The text shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingField(field) => field.question().to_string(),
            Self::NoDataFound {
                job_title,
                location,
            } => format!(
                "I couldn't find market data for \"{job_title}\" in {location}, so I can't \
                 produce a recommendation. Please check the job title spelling, or try a \
                 title and location that exist in the compensation ranges table."
            ),
            Self::ValidationFailure(problems) => format!(
                "This recommendation needs review before it is shared: {}",
                problems.join("; ")
            ),
            Self::UpstreamUnavailable(_) | Self::Store(_) => {
                "Sorry, I'm having trouble reaching one of my data sources right now. \
                 Nothing was changed; please try again in a moment."
                    .to_string()
            }
            Self::Command(reason) => reason.clone(),
            Self::NotPermitted(reason) => reason.clone(),
        }
    }
}

impl From<ProviderError> for TurnError {
    fn from(e: ProviderError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}

impl From<LookupError> for TurnError {
    fn from(e: LookupError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}
