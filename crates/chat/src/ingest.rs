//! Document ingestion — uploaded file to embedded, searchable chunks.

use std::sync::Arc;

use orgchat_config::AppConfig;
use orgchat_core::error::{Error, Result};
use orgchat_core::provider::{EmbeddingRequest, Provider};
use orgchat_core::{
    AuthenticatedUser, ConversationId, ConversationStore, DocumentChunk, DocumentId,
    DocumentStore, FileStore, NewDocument,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunking::split_into_chunks;

/// File types accepted for ingestion, decided by file name extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Csv,
    Text,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Turn the fetched bytes into plain text. PDF text is extracted on a
    /// blocking thread; everything else must be UTF-8.
    pub async fn extract_text(self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        match self {
            Self::Pdf => {
                let extracted =
                    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                        .await;
                match extracted {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => {
                        debug!(file = %file_name, error = ?e, "PDF extraction failed");
                        Err(Error::InvalidInput(format!("{file_name} is not a readable PDF")))
                    }
                    // The extractor panics on some malformed files.
                    Err(e) => {
                        warn!(file = %file_name, error = %e, "PDF extraction aborted");
                        Err(Error::InvalidInput(format!("{file_name} is not a readable PDF")))
                    }
                }
            }
            Self::Csv | Self::Text | Self::Markdown => String::from_utf8(bytes)
                .map_err(|_| Error::InvalidInput(format!("{file_name} is not valid UTF-8 text"))),
        }
    }
}

/// An ingestion request for a file already uploaded to storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub chunks: usize,
}

pub struct IngestService {
    conversations: Arc<dyn ConversationStore>,
    documents: Arc<dyn DocumentStore>,
    files: Arc<dyn FileStore>,
    provider: Arc<dyn Provider>,
    embedding_model: String,
    max_chunk_chars: usize,
    batch_size: usize,
}

impl IngestService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        documents: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStore>,
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> Self {
        Self {
            conversations,
            documents,
            files,
            provider,
            embedding_model: config.retrieval.embedding_model.clone(),
            max_chunk_chars: config.ingest.max_chunk_chars.max(1),
            batch_size: config.ingest.embed_batch_size.max(1),
        }
    }

    /// Ingest one uploaded file into `conversationId`'s owner's documents.
    pub async fn ingest(
        &self,
        user: &AuthenticatedUser,
        request: IngestRequest,
    ) -> Result<IngestReport> {
        let file_path = required(request.file_path, "filePath")?;
        let conversation_id = ConversationId(required(request.conversation_id, "conversationId")?);
        let file_name = required(request.file_name, "fileName")?;

        let format = DocumentFormat::from_file_name(&file_name)
            .ok_or_else(|| Error::UnsupportedFormat(file_name.clone()))?;

        let settings = match self.conversations.get_settings(&conversation_id).await? {
            Some(settings) if settings.owner == user.id => settings,
            _ => return Err(Error::NotFound(format!("conversation {conversation_id}"))),
        };

        let bytes = self.files.fetch(&file_path).await?;
        let text = format.extract_text(bytes, &file_name).await?;

        let document_id = self
            .documents
            .insert_document(NewDocument {
                owner: settings.owner,
                conversation_id: conversation_id.clone(),
                name: file_name.clone(),
                file_path,
            })
            .await?;

        let pieces = split_into_chunks(&text, self.max_chunk_chars);
        debug!(?format, chunks = pieces.len(), "Split document");

        let mut stored = 0;
        for batch in pieces.chunks(self.batch_size) {
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.embedding_model.clone(),
                    inputs: batch.to_vec(),
                })
                .await?;

            if response.embeddings.len() != batch.len() {
                return Err(Error::Internal(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }

            let chunks = batch
                .iter()
                .zip(response.embeddings)
                .map(|(content, embedding)| DocumentChunk {
                    document_id: document_id.clone(),
                    content: content.clone(),
                    embedding,
                })
                .collect();
            stored += self.documents.insert_chunks(chunks).await?;
        }

        info!(
            document = %document_id,
            conversation = %conversation_id,
            file = %file_name,
            chunks = stored,
            "Document ingested"
        );

        Ok(IngestReport {
            document_id,
            chunks: stored,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingField(field.into()))
}
