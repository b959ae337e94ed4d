//! Store traits — the persistence collaborators of the chat endpoint.
//!
//! - [`ConversationStore`]: conversation settings and the message history
//! - [`DocumentStore`]: ingested documents and chunk similarity search
//! - [`FileStore`]: raw bytes of uploaded files
//!
//! Implementations: in-memory (for tests and local runs), PostgreSQL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::UserId;
use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, ConversationSettings, Message, Role};
use crate::retrieval::{DocumentChunk, DocumentId, NewDocument, RetrievalChunk};

/// A partial update of conversation settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.model.is_none()
    }

    /// Apply this update to a settings snapshot.
    pub fn apply(&self, settings: &mut ConversationSettings) {
        if let Some(pinned) = self.pinned {
            settings.pinned = pinned;
        }
        if let Some(model) = &self.model {
            settings.model = Some(model.clone());
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "postgres").
    fn name(&self) -> &str;

    /// Create an empty conversation.
    async fn create_conversation(
        &self,
        owner: &UserId,
        model: Option<String>,
    ) -> Result<Conversation, StoreError>;

    /// Read the settings of a conversation, `None` if it does not exist.
    async fn get_settings(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSettings>, StoreError>;

    /// Update settings, returning the new snapshot or `None` if unknown.
    async fn update_settings(
        &self,
        id: &ConversationId,
        update: SettingsUpdate,
    ) -> Result<Option<ConversationSettings>, StoreError>;

    /// Persist a message and return it as stored.
    async fn append_message(
        &self,
        id: &ConversationId,
        author: &UserId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// All messages of a conversation in ascending creation order.
    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Record an uploaded document and return its ID.
    async fn insert_document(&self, document: NewDocument) -> Result<DocumentId, StoreError>;

    /// Store embedded chunks; returns how many were written.
    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError>;

    /// Chunks of `owner`'s documents whose similarity to `embedding` is
    /// above `threshold`, most similar first, at most `count`.
    async fn match_chunks(
        &self,
        owner: &UserId,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievalChunk>, StoreError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    fn name(&self) -> &str;

    /// Download the file at `path`.
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_update_applies_only_present_fields() {
        let mut settings = ConversationSettings {
            id: ConversationId::from("c1"),
            owner: UserId::from("u1"),
            pinned: false,
            model: Some("gpt-3.5-turbo".into()),
        };

        SettingsUpdate {
            pinned: Some(true),
            model: None,
        }
        .apply(&mut settings);

        assert!(settings.pinned);
        assert_eq!(settings.model.as_deref(), Some("gpt-3.5-turbo"));
        assert!(SettingsUpdate::default().is_empty());
    }
}
