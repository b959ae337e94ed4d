//! In-memory store — useful for testing and local runs without a database.
//!
//! Implements all three store traits over maps guarded by `tokio::sync::RwLock`.

use async_trait::async_trait;
use chrono::Utc;
use orgchat_core::error::StoreError;
use orgchat_core::{
    Conversation, ConversationId, ConversationSettings, ConversationStore, DocumentChunk,
    DocumentId, DocumentStore, FileStore, Message, NewDocument, RetrievalChunk, Role,
    SettingsUpdate, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector::rank_by_similarity;

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    documents: HashMap<DocumentId, NewDocument>,
    chunks: Vec<DocumentChunk>,
    files: HashMap<String, Vec<u8>>,
}

/// An in-memory store. Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place file bytes at `path` so `fetch` can return them.
    pub async fn put_file(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.inner
            .write()
            .await
            .files
            .insert(path.into(), bytes.into());
    }

    /// Number of stored document chunks.
    pub async fn chunk_count(&self) -> usize {
        self.inner.read().await.chunks.len()
    }

    /// Number of recorded documents.
    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        owner: &UserId,
        model: Option<String>,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation::new(owner.clone());
        conversation.model = model;
        self.inner
            .write()
            .await
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get_settings(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSettings>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .conversations
            .get(id)
            .map(Conversation::settings))
    }

    async fn update_settings(
        &self,
        id: &ConversationId,
        update: SettingsUpdate,
    ) -> Result<Option<ConversationSettings>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = inner.conversations.get_mut(id) else {
            return Ok(None);
        };

        let mut settings = conversation.settings();
        update.apply(&mut settings);
        conversation.pinned = settings.pinned;
        conversation.model = settings.model.clone();
        conversation.updated_at = Utc::now();
        Ok(Some(settings))
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        _author: &UserId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::QueryFailed(format!("conversation {id} does not exist")))?;

        let message = Message::new(role, content);
        conversation.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        // Insertion order is creation order, so no sort is needed.
        Ok(self
            .inner
            .read()
            .await
            .conversations
            .get(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert_document(&self, document: NewDocument) -> Result<DocumentId, StoreError> {
        let id = DocumentId::new();
        self.inner
            .write()
            .await
            .documents
            .insert(id.clone(), document);
        Ok(id)
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(orphan) = chunks
            .iter()
            .find(|c| !inner.documents.contains_key(&c.document_id))
        {
            return Err(StoreError::QueryFailed(format!(
                "document {} does not exist",
                orphan.document_id
            )));
        }

        let count = chunks.len();
        inner.chunks.extend(chunks);
        Ok(count)
    }

    async fn match_chunks(
        &self,
        owner: &UserId,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievalChunk>, StoreError> {
        let inner = self.inner.read().await;
        let owned = |chunk: &&DocumentChunk| {
            inner
                .documents
                .get(&chunk.document_id)
                .is_some_and(|doc| &doc.owner == owner)
        };
        Ok(rank_by_similarity(
            inner
                .chunks
                .iter()
                .filter(owned)
                .map(|c| (c.content.as_str(), c.embedding.as_slice())),
            embedding,
            threshold,
            count,
        ))
    }
}

#[async_trait]
impl FileStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner
            .read()
            .await
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::FetchFailed(format!("no file at '{path}'")))
    }
}
