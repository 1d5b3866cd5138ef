//! LLM Provider implementations for CompAgent.
//!
//! All providers implement the `compagent_core::Provider` trait.
//! The router builds the configured fallback chain.

pub mod fallback;
pub mod openai_compat;
pub mod router;

pub use fallback::{ChainLink, FallbackProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_chain, build_from_config};
