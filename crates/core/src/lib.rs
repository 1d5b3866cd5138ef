//! # CompAgent Core
//!
//! Domain types, capability traits, and error definitions for the CompAgent
//! compensation assistant. This crate has no framework dependencies; it
//! defines the model every other crate implements against.
//!
//! ## Capabilities
//!
//! Three external collaborators are modelled as traits here:
//! - [`Provider`]: untrusted text completion (the LLM boundary)
//! - [`LookupProvider`]: exact-match rows from the market and parity tables
//! - [`ContextStore`]: per-candidate records with audit trail and expiry
//!
//! Implementations live in `compagent-providers`, `compagent-data`, and
//! `compagent-store`, so tests can swap in mocks freely.

pub mod audit;
pub mod candidate;
pub mod error;
pub mod event;
pub mod lookup;
pub mod message;
pub mod provider;
pub mod recommendation;
pub mod store;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use audit::{AuditClock, AuditEntry, FieldChange};
pub use candidate::{
    AdditionalContext, CandidateContext, CandidateStatus, CompleteFields, ContextPatch,
    InterviewFeedback, JobFamily, JobLevel, Location, Proficiency, RequiredField,
};
pub use error::{Error, LookupError, ProviderError, Result, StoreError, TurnError};
pub use event::{DomainEvent, EventBus};
pub use lookup::{CachedLookup, Catalog, LookupKey, LookupProvider, LookupTable, MarketRow, ParityRow};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use recommendation::{
    Citation, GuardrailFlag, InternalParity, MarketRange, Reasoning, Recommendation,
    RecommendationSnapshot, RecommendationStatus, ValidationReport,
};
pub use store::{ContextStore, DEFAULT_RETENTION_DAYS, RESET_FIELD};
pub use user::{User, UserType};
