//! Retrieval domain types: ingested documents and the chunks that similarity
//! search hands back to the chat endpoint.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::UserId;
use crate::message::ConversationId;

/// A fragment of ingested document text returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalChunk {
    /// The chunk text, treated as opaque
    pub content: String,

    /// Cosine similarity to the query embedding
    #[serde(default)]
    pub similarity: f32,
}

impl RetrievalChunk {
    pub fn new(content: impl Into<String>, similarity: f32) -> Self {
        Self {
            content: content.into(),
            similarity,
        }
    }
}

/// Identifier of an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata recorded for an uploaded file before its chunks are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub owner: UserId,
    pub conversation_id: ConversationId,
    /// Original file name as uploaded
    pub name: String,
    /// Path of the file inside the storage bucket
    pub file_path: String,
}

/// A chunk of document text with its embedding, ready to be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub document_id: DocumentId,
    pub content: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}
