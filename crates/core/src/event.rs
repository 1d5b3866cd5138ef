//! Domain event system. Decoupled notifications between bounded contexts.
//!
//! The assistant publishes an event after each turn step worth observing;
//! the gateway relays them to operators as an SSE stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// Fields on a candidate record changed
    ContextUpdated {
        candidate_id: String,
        user: String,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The engine produced a recommendation
    RecommendationProduced {
        candidate_id: String,
        total_compensation: f64,
        currency: String,
        needs_review: bool,
        timestamp: DateTime<Utc>,
    },

    /// A turn finished, successfully or not
    TurnCompleted {
        candidate_id: Option<String>,
        user: String,
        outcome: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A user rated a response
    FeedbackSubmitted {
        response_id: String,
        feedback_type: String,
        user: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Stable snake_case name, used as the SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContextUpdated { .. } => "context_updated",
            Self::RecommendationProduced { .. } => "recommendation_produced",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::FeedbackSubmitted { .. } => "feedback_submitted",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
