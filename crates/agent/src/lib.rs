//! The CompAgent turn pipeline.
//!
//! Each user message goes through one linear pass:
//!
//! 1. **Commands**: `/switch`, `/close`, ... act on the stores directly
//! 2. **Resolve** the candidate the message is about
//! 3. **Extract** a validated partial update with the completion provider
//! 4. **Ask** for the next missing required field, one at a time
//! 5. **Recommend** from the lookup tables, reusing the cache when its key matches
//! 6. **Validate** the numbers against the rows they came from
//! 7. **Commit** the cache and a history snapshot, then render the answer
//!
//! Arithmetic never comes from the completion provider; it only turns text
//! into fields.

pub mod commands;
pub mod engine;
pub mod extractor;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod stream_event;
pub mod validator;

#[cfg(test)]
mod test_helpers;

pub use commands::{CommandOutcome, SlashCommand};
pub use engine::{CacheDecision, EngineInput, EngineOutcome, EnginePolicy, RecommendationEngine};
pub use extractor::{Extraction, FieldExtractor, Intent};
pub use pipeline::{Assistant, TurnRequest, TurnState};
pub use stream_event::{TurnEvent, TurnResponse};
pub use validator::Validator;
