//! Storage for CompAgent: candidate records with their audit log, each
//! user's current candidate, and per-user message history.
//!
//! Everything is JSON on disk (or purely in memory for tests). Files are
//! rewritten whole on every mutation; the data volumes here are small.

pub mod file_context;
pub mod in_memory;
pub mod message_store;
pub mod state;
pub mod user_store;

pub use file_context::FileContextStore;
pub use in_memory::InMemoryContextStore;
pub use message_store::{FeedbackKind, MessageRecord, MessageStore};
pub use state::ContextState;
pub use user_store::UserContextStore;

use std::path::Path;
use std::sync::Arc;

use compagent_core::{ContextStore, StoreError};

/// Build a context store by backend name ("file" or "memory").
pub fn open_context_store(
    backend: &str,
    dir: &Path,
    retention_days: u32,
) -> Result<Arc<dyn ContextStore>, StoreError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryContextStore::new(retention_days))),
        "file" => Ok(Arc::new(FileContextStore::open(dir, retention_days)?)),
        other => Err(StoreError::Io(format!("unknown store backend '{other}'"))),
    }
}
