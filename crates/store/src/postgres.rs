//! PostgreSQL + pgvector store.
//!
//! Implements [`ConversationStore`] and [`DocumentStore`] with:
//! - Conversations, messages, and documents as plain tables via `sqlx`
//! - Chunk similarity search through the `match_document_chunks` SQL function
//!
//! # Setup
//!
//! ```sql
//! CREATE EXTENSION IF NOT EXISTS vector;
//! ```
//!
//! The managed backend normally owns these objects. For a local database set
//! `store.run_migrations = true` to apply `migrations/001_create_orgchat.sql`.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};

use orgchat_core::error::StoreError;
use orgchat_core::{
    Conversation, ConversationId, ConversationSettings, ConversationStore, DocumentChunk,
    DocumentId, DocumentStore, Message, NewDocument, RetrievalChunk, Role, SettingsUpdate,
    UserId,
};

use crate::vector::to_pgvector;

/// PostgreSQL store with pgvector similarity search.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Storage(format!("PostgreSQL connection failed: {e}")))?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the schema migration.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../migrations/001_create_orgchat.sql");

        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Migration failed: {e}")))?;

        info!("Schema migration complete");
        Ok(())
    }
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn row_to_settings(row: &PgRow) -> Result<ConversationSettings, StoreError> {
    Ok(ConversationSettings {
        id: ConversationId(row.try_get("id").map_err(query_failed)?),
        owner: UserId(row.try_get("user_id").map_err(query_failed)?),
        pinned: row.try_get("is_pinned").map_err(query_failed)?,
        model: row.try_get("model").map_err(query_failed)?,
    })
}

fn row_to_message(row: &PgRow) -> Result<Message, StoreError> {
    let role: String = row.try_get("role").map_err(query_failed)?;
    Ok(Message {
        id: row.try_get("id").map_err(query_failed)?,
        role: role.parse::<Role>().map_err(StoreError::QueryFailed)?,
        content: row.try_get("content").map_err(query_failed)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(query_failed)?,
    })
}

#[async_trait]
impl ConversationStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn create_conversation(
        &self,
        owner: &UserId,
        model: Option<String>,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation::new(owner.clone());
        conversation.model = model;

        sqlx::query(
            "INSERT INTO conversations (id, user_id, is_pinned, model, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(conversation.id.as_str())
        .bind(owner.as_str())
        .bind(conversation.pinned)
        .bind(conversation.model.as_deref())
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(conversation)
    }

    async fn get_settings(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSettings>, StoreError> {
        let row = sqlx::query("SELECT id, user_id, is_pinned, model FROM conversations WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;

        row.as_ref().map(row_to_settings).transpose()
    }

    async fn update_settings(
        &self,
        id: &ConversationId,
        update: SettingsUpdate,
    ) -> Result<Option<ConversationSettings>, StoreError> {
        let row = sqlx::query(
            "UPDATE conversations SET \
               is_pinned = COALESCE($2, is_pinned), \
               model = COALESCE($3, model), \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING id, user_id, is_pinned, model",
        )
        .bind(id.as_str())
        .bind(update.pinned)
        .bind(update.model.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        row.as_ref().map(row_to_settings).transpose()
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        author: &UserId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let message = Message::new(role, content);

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, user_id, role, content, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&message.id)
        .bind(id.as_str())
        .bind(author.as_str())
        .bind(role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(message.created_at)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;

        Ok(message)
    }

    async fn list_messages(&self, id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter().map(row_to_message).collect()
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert_document(&self, document: NewDocument) -> Result<DocumentId, StoreError> {
        let id = DocumentId::new();

        sqlx::query(
            "INSERT INTO documents (id, user_id, conversation_id, name, file_path) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&id.0)
        .bind(document.owner.as_str())
        .bind(document.conversation_id.as_str())
        .bind(&document.name)
        .bind(&document.file_path)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(id)
    }

    async fn insert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO document_chunks (document_id, content, embedding) \
                 VALUES ($1, $2, $3::vector)",
            )
            .bind(&chunk.document_id.0)
            .bind(&chunk.content)
            .bind(to_pgvector(&chunk.embedding))
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        }

        tx.commit().await.map_err(query_failed)?;
        debug!(count = chunks.len(), "Stored document chunks");
        Ok(chunks.len())
    }

    async fn match_chunks(
        &self,
        owner: &UserId,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<RetrievalChunk>, StoreError> {
        let rows = sqlx::query(
            "SELECT content, similarity FROM match_document_chunks($1::vector, $2, $3, $4)",
        )
        .bind(to_pgvector(embedding))
        .bind(threshold as f64)
        .bind(count as i32)
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        rows.iter()
            .map(|row| {
                let similarity: f64 = row.try_get("similarity").map_err(query_failed)?;
                Ok(RetrievalChunk::new(
                    row.try_get::<String, _>("content").map_err(query_failed)?,
                    similarity as f32,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn migration_defines_match_function() {
        let sql = include_str!("../migrations/001_create_orgchat.sql");
        assert!(sql.contains("CREATE OR REPLACE FUNCTION match_document_chunks"));
        assert!(sql.contains("vector(1536)"));
    }

    #[test]
    fn match_function_filters_by_owner() {
        let sql = include_str!("../migrations/001_create_orgchat.sql");
        let function = &sql[sql.find("FUNCTION match_document_chunks").unwrap()..];
        assert!(function.contains("owner_id TEXT"));
        assert!(function.contains("WHERE documents.user_id = owner_id"));
    }
}
