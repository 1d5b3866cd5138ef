//! Turn-level streaming events.
//!
//! `TurnEvent` is what the gateway forwards to clients over SSE while a turn
//! runs: zero or more `processing` steps, then exactly one `response` or
//! `error`.

use compagent_core::candidate::RequiredField;
use compagent_core::recommendation::{Recommendation, RecommendationSnapshot};
use serde::{Deserialize, Serialize};

use crate::pipeline::TurnState;

/// The final result of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Text shown to the user.
    pub content: String,

    /// Candidate the turn resolved to, if any.
    pub candidate_id: Option<String>,

    /// Set when this turn produced a recommendation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,

    /// Id of the stored message record, used for feedback.
    pub response_id: String,

    /// Recommendation history for the candidate, newest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RecommendationSnapshot>,

    /// Where the turn stopped.
    pub state: TurnState,

    /// The field being asked for, when the turn ended in a question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_field: Option<RequiredField>,

    /// Error kind when the turn failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Events emitted while a turn is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A progress step.
    Processing { step: String, message: String },

    /// The turn finished.
    Response(TurnResponse),

    /// The turn failed. The session stays usable.
    Error {
        message: String,
        kind: String,
        candidate_id: Option<String>,
        response_id: String,
    },
}

impl TurnEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::Response(_) => "response",
            Self::Error { .. } => "error",
        }
    }

    pub(crate) fn processing(step: &str, message: &str) -> Self {
        Self::Processing {
            step: step.to_string(),
            message: message.to_string(),
        }
    }

    /// Terminal event for a finished turn.
    pub fn from_response(response: TurnResponse) -> Self {
        match &response.error {
            Some(kind) => Self::Error {
                message: response.content.clone(),
                kind: kind.clone(),
                candidate_id: response.candidate_id.clone(),
                response_id: response.response_id.clone(),
            },
            None => Self::Response(response),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }
}
