//! LLM provider implementations for orgchat.
//!
//! All providers implement the `orgchat_core::Provider` trait.
//! The router selects the configured provider.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
