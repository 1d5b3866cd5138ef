//! Per-user message history: every exchange with the assistant, plus any
//! feedback the user left on a response.
//!
//! With a directory, each user's history lives in
//! `messages/user_<sanitized email>.json` and is rewritten on every save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compagent_core::error::StoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Feedback a user can leave on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsDown,
    ReportError,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThumbsDown => "thumbs_down",
            Self::ReportError => "report_error",
        }
    }
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "thumbs_down" => Ok(Self::ThumbsDown),
            "report_error" => Ok(Self::ReportError),
            other => Err(format!("unknown feedback type '{other}'")),
        }
    }
}

/// One user message and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Also the response id feedback refers to.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackKind>,
}

impl MessageRecord {
    pub fn new(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            message: message.into(),
            response: response.into(),
            session_id: None,
            request_id: None,
            candidate_id: None,
            feedback: None,
        }
    }

    pub fn with_candidate(mut self, candidate_id: Option<String>) -> Self {
        self.candidate_id = candidate_id;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_request(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Message history for all users.
#[derive(Clone, Default)]
pub struct MessageStore {
    dir: Option<PathBuf>,
    /// Oldest first, per lowercased user.
    messages: Arc<RwLock<HashMap<String, Vec<MessageRecord>>>>,
}

impl MessageStore {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backed by files under `dir/messages`. Histories load lazily per user.
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: Some(dir.join("messages")),
            messages: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a record to the user's history.
    pub async fn save(&self, user: &str, record: MessageRecord) -> Result<(), StoreError> {
        let key = user.to_lowercase();
        let mut messages = self.messages.write().await;
        let history = self.history_mut(&mut messages, &key);
        history.push(record);
        debug!(user = %key, total = history.len(), "Message saved");
        self.flush(&key, history)
    }

    /// A page of the user's history, newest first, optionally for one
    /// candidate only.
    pub async fn get_messages(
        &self,
        user: &str,
        candidate_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<MessageRecord> {
        let key = user.to_lowercase();
        let mut messages = self.messages.write().await;
        self.history_mut(&mut messages, &key)
            .iter()
            .rev()
            .filter(|m| candidate_id.is_none_or(|id| m.candidate_id.as_deref() == Some(id)))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records, optionally for one candidate only.
    pub async fn count(&self, user: &str, candidate_id: Option<&str>) -> usize {
        let key = user.to_lowercase();
        let mut messages = self.messages.write().await;
        self.history_mut(&mut messages, &key)
            .iter()
            .filter(|m| candidate_id.is_none_or(|id| m.candidate_id.as_deref() == Some(id)))
            .count()
    }

    /// Candidate ids from the user's history, most recent first, without
    /// duplicates.
    pub async fn recent_candidate_ids(&self, user: &str) -> Vec<String> {
        let key = user.to_lowercase();
        let mut messages = self.messages.write().await;
        let mut ids: Vec<String> = Vec::new();
        for record in self.history_mut(&mut messages, &key).iter().rev() {
            if let Some(id) = &record.candidate_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Attach feedback to one of the user's responses. Returns whether the
    /// response was found.
    pub async fn record_feedback(
        &self,
        user: &str,
        response_id: &str,
        kind: FeedbackKind,
    ) -> Result<bool, StoreError> {
        let key = user.to_lowercase();
        let mut messages = self.messages.write().await;
        let history = self.history_mut(&mut messages, &key);
        let Some(record) = history.iter_mut().find(|m| m.id == response_id) else {
            return Ok(false);
        };
        record.feedback = Some(kind);
        self.flush(&key, history)?;
        Ok(true)
    }

    fn history_mut<'a>(
        &self,
        messages: &'a mut HashMap<String, Vec<MessageRecord>>,
        key: &str,
    ) -> &'a mut Vec<MessageRecord> {
        messages
            .entry(key.to_string())
            .or_insert_with(|| self.load(key))
    }

    fn load(&self, key: &str) -> Vec<MessageRecord> {
        let Some(path) = self.path_for(key) else {
            return Vec::new();
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "Ignoring corrupted message history");
            Vec::new()
        })
    }

    fn flush(&self, key: &str, history: &[MessageRecord]) -> Result<(), StoreError> {
        let Some(path) = self.path_for(key) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("Failed to create messages directory: {e}")))?;
        }
        let json = serde_json::to_string_pretty(history)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(&path, json)
            .map_err(|e| StoreError::Io(format!("Failed to write message history: {e}")))
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        Some(dir.join(format!("user_{}.json", sanitize(key))))
    }
}

/// Make an email safe to use in a file name.
fn sanitize(user: &str) -> String {
    user.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            '@' => '_',
            _ => '.',
        })
        .collect()
}
