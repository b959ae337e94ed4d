//! # orgchat Core
//!
//! Domain types, collaborator traits, and error definitions for orgchat.
//! This crate has **zero framework dependencies**; it defines the domain model
//! that the store, provider, chat, and gateway crates implement against.
//!
//! Every external collaborator of the chat endpoint (message store, retrieval
//! service, language-model client, authentication) is a trait here, so the
//! context-assembly logic can be exercised against in-memory doubles.

pub mod auth;
pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use auth::{AuthenticatedUser, Authenticator, UserId};
pub use error::{Error, ProviderError, Result, StoreError};
pub use message::{Conversation, ConversationId, ConversationSettings, Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use retrieval::{DocumentChunk, DocumentId, NewDocument, RetrievalChunk};
pub use store::{ConversationStore, DocumentStore, FileStore, SettingsUpdate};
