//! Chat service — one user turn from persisted message to persisted reply.
//!
//! Sequence per turn:
//! load settings → persist user message → (fetch history ∥ retrieve chunks)
//! → assemble → complete → persist reply.

use std::sync::Arc;

use orgchat_config::AppConfig;
use orgchat_core::error::{Error, Result};
use orgchat_core::provider::{EmbeddingRequest, Provider, ProviderRequest, Usage};
use orgchat_core::{
    AuthenticatedUser, Conversation, ConversationId, ConversationSettings, ConversationStore,
    DocumentStore, Message, RetrievalChunk, Role, SettingsUpdate, UserId,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{AssembledContext, AssemblyReport, ContextAssembler};

/// Reply text used when the model returns an empty completion.
pub const EMPTY_REPLY_FALLBACK: &str = "No reply";

/// Model and retrieval parameters for the chat turn.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Used when the conversation has no model set.
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub embedding_model: String,
    pub match_threshold: f32,
    pub match_count: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ChatOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_model: config.chat.default_model.clone(),
            temperature: config.chat.temperature,
            max_tokens: config.chat.max_tokens,
            embedding_model: config.retrieval.embedding_model.clone(),
            match_threshold: config.retrieval.match_threshold,
            match_count: config.retrieval.match_count,
        }
    }
}

/// The result of a chat turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// The persisted assistant message.
    pub assistant_message: Message,
    /// The model that was asked.
    pub model: String,
    pub context: AssemblyReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<Usage> for UsageSummary {
    fn from(u: Usage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    documents: Arc<dyn DocumentStore>,
    provider: Arc<dyn Provider>,
    assembler: ContextAssembler,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        documents: Arc<dyn DocumentStore>,
        provider: Arc<dyn Provider>,
        assembler: ContextAssembler,
        options: ChatOptions,
    ) -> Self {
        Self {
            conversations,
            documents,
            provider,
            assembler,
            options,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        conversations: Arc<dyn ConversationStore>,
        documents: Arc<dyn DocumentStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self::new(
            conversations,
            documents,
            provider,
            ContextAssembler::from_config(&config.context, &config.retrieval),
            ChatOptions::from(config),
        )
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Run one chat turn for `user` on `conversation_id`.
    pub async fn send(
        &self,
        user: &AuthenticatedUser,
        conversation_id: &ConversationId,
        user_message: &str,
    ) -> Result<ChatReply> {
        if conversation_id.as_str().trim().is_empty() {
            return Err(Error::MissingField("conversationId".into()));
        }
        if user_message.trim().is_empty() {
            return Err(Error::MissingField("userMessage".into()));
        }

        let settings = self.owned_settings(user, conversation_id).await?;

        self.conversations
            .append_message(conversation_id, &user.id, Role::User, user_message)
            .await?;

        let (history, chunks) = tokio::try_join!(
            self.history(conversation_id),
            self.retrieve(&user.id, user_message)
        )?;

        let assembled = self.assembler.assemble(&history, &chunks, settings.pinned);
        let model = self.model_for(&settings);

        let response = self
            .provider
            .complete(ProviderRequest {
                model: model.clone(),
                messages: assembled.messages,
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
            })
            .await?;

        let reply = if response.message.content.trim().is_empty() {
            EMPTY_REPLY_FALLBACK
        } else {
            response.message.content.as_str()
        };

        let assistant_message = self
            .conversations
            .append_message(conversation_id, &user.id, Role::Assistant, reply)
            .await?;

        info!(
            conversation = %conversation_id,
            model = %model,
            history_tokens = assembled.report.history_tokens,
            retrieval_tokens = assembled.report.retrieval_tokens,
            "Chat turn completed"
        );

        Ok(ChatReply {
            assistant_message,
            model,
            context: assembled.report,
            usage: response.usage.map(UsageSummary::from),
        })
    }

    /// Assemble the context the next turn would see, without calling the
    /// model or persisting anything. `query` drives retrieval when given.
    pub async fn preview(
        &self,
        user: &AuthenticatedUser,
        conversation_id: &ConversationId,
        query: Option<&str>,
    ) -> Result<AssembledContext> {
        let settings = self.owned_settings(user, conversation_id).await?;

        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let (history, chunks) = tokio::try_join!(self.history(conversation_id), async {
            match query {
                Some(q) => self.retrieve(&user.id, q).await,
                None => Ok(Vec::new()),
            }
        })?;

        Ok(self.assembler.assemble(&history, &chunks, settings.pinned))
    }

    /// Create a conversation owned by `user`.
    pub async fn create_conversation(
        &self,
        user: &AuthenticatedUser,
        model: Option<String>,
    ) -> Result<Conversation> {
        let model = model.filter(|m| !m.trim().is_empty());
        let conversation = self.conversations.create_conversation(&user.id, model).await?;
        info!(conversation = %conversation.id, user = %user.id, "Conversation created");
        Ok(conversation)
    }

    /// Change the pinned flag or model of a conversation owned by `user`.
    pub async fn update_settings(
        &self,
        user: &AuthenticatedUser,
        conversation_id: &ConversationId,
        update: SettingsUpdate,
    ) -> Result<ConversationSettings> {
        let current = self.owned_settings(user, conversation_id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        if update.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(Error::InvalidInput("model must not be empty".into()));
        }

        self.conversations
            .update_settings(conversation_id, update)
            .await?
            .ok_or_else(|| not_found(conversation_id))
    }

    /// The stored messages of a conversation owned by `user`.
    pub async fn messages(
        &self,
        user: &AuthenticatedUser,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>> {
        self.owned_settings(user, conversation_id).await?;
        self.history(conversation_id).await
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    /// Settings of a conversation `user` owns. Someone else's conversation
    /// is reported as not found.
    async fn owned_settings(
        &self,
        user: &AuthenticatedUser,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSettings> {
        match self.conversations.get_settings(conversation_id).await? {
            Some(settings) if settings.owner == user.id => Ok(settings),
            _ => Err(not_found(conversation_id)),
        }
    }

    async fn history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        Ok(self.conversations.list_messages(conversation_id).await?)
    }

    /// Embed `text` and fetch matching chunks from `owner`'s documents;
    /// empty when retrieval is off.
    async fn retrieve(&self, owner: &UserId, text: &str) -> Result<Vec<RetrievalChunk>> {
        if !self.assembler.injection().enabled {
            return Ok(Vec::new());
        }

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.options.embedding_model.clone(),
                inputs: vec![text.to_string()],
            })
            .await?;

        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("embedding response was empty".into()))?;

        let chunks = self
            .documents
            .match_chunks(
                owner,
                &embedding,
                self.options.match_threshold,
                self.options.match_count,
            )
            .await?;

        debug!(matched = chunks.len(), "Retrieved document chunks");
        Ok(chunks)
    }

    fn model_for(&self, settings: &ConversationSettings) -> String {
        settings
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.options.default_model)
            .to_string()
    }
}

fn not_found(conversation_id: &ConversationId) -> Error {
    Error::NotFound(format!("conversation {conversation_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orgchat_core::error::ProviderError;
    use orgchat_core::provider::{EmbeddingResponse, ProviderResponse};
    use orgchat_core::{DocumentChunk, NewDocument};
    use orgchat_store::InMemoryStore;
    use std::sync::Mutex;

    // ── Mock provider ──────────────────────────────────────────────────

    /// Replies with a fixed text, embeds everything as `[1, 0]`, and records
    /// each completion request.
    struct MockProvider {
        reply: String,
        requests: Mutex<Vec<ProviderRequest>>,
        embed_calls: Mutex<usize>,
    }

    impl MockProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                requests: Mutex::new(Vec::new()),
                embed_calls: Mutex::new(0),
            })
        }

        fn last_request(&self) -> ProviderRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                message: Message::assistant(self.reply.clone()),
                usage: None,
                model,
            })
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> std::result::Result<EmbeddingResponse, ProviderError> {
            *self.embed_calls.lock().unwrap() += 1;
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection reset".into()))
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn user(id: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            id: UserId::from(id),
            email: None,
        }
    }

    fn service_with(
        store: &InMemoryStore,
        provider: Arc<dyn Provider>,
        config: &AppConfig,
    ) -> ChatService {
        ChatService::from_config(
            config,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            provider,
        )
    }

    async fn seed_chunk(store: &InMemoryStore, owner: &UserId, conv: &ConversationId, text: &str) {
        let doc = store
            .insert_document(NewDocument {
                owner: owner.clone(),
                conversation_id: conv.clone(),
                name: "handbook.md".into(),
                file_path: "u1/handbook.md".into(),
            })
            .await
            .unwrap();
        store
            .insert_chunks(vec![DocumentChunk {
                document_id: doc,
                content: text.into(),
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap();
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_persists_both_messages_and_returns_reply() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("Hi there!");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let reply = service.send(&alice, &conv.id, "Hello").await.unwrap();

        assert_eq!(reply.assistant_message.content, "Hi there!");
        assert_eq!(reply.assistant_message.role, Role::Assistant);
        assert_eq!(reply.model, "gpt-3.5-turbo");

        let stored = service.messages(&alice, &conv.id).await.unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        // The user's new message is part of the submitted context.
        let request = provider.last_request();
        assert_eq!(request.messages.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn conversation_model_overrides_default() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");

        let conv = service
            .create_conversation(&alice, Some("gpt-4o".into()))
            .await
            .unwrap();
        let reply = service.send(&alice, &conv.id, "Hello").await.unwrap();

        assert_eq!(reply.model, "gpt-4o");
        assert_eq!(provider.last_request().model, "gpt-4o");
    }

    #[tokio::test]
    async fn empty_completion_replaced_with_fallback() {
        let store = InMemoryStore::new();
        let service = service_with(&store, MockProvider::new("  "), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let reply = service.send(&alice, &conv.id, "Hello").await.unwrap();
        assert_eq!(reply.assistant_message.content, EMPTY_REPLY_FALLBACK);
    }

    #[tokio::test]
    async fn retrieval_chunks_injected_as_leading_system_entry() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        seed_chunk(&store, &alice.id, &conv.id, "Vacation is 25 days.").await;

        let reply = service
            .send(&alice, &conv.id, "How much vacation?")
            .await
            .unwrap();

        let request = provider.last_request();
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.ends_with("Vacation is 25 days."));
        assert_eq!(reply.context.chunks_injected, 1);
    }

    #[tokio::test]
    async fn retrieval_never_crosses_users() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");
        let bob = user("bob");

        let alice_conv = service.create_conversation(&alice, None).await.unwrap();
        seed_chunk(&store, &alice.id, &alice_conv.id, "Alice earns 9000.").await;
        let bob_conv = service.create_conversation(&bob, None).await.unwrap();

        let reply = service.send(&bob, &bob_conv.id, "hi").await.unwrap();

        let request = provider.last_request();
        assert_eq!(reply.context.chunks_injected, 0);
        assert_eq!(request.messages.len(), 1);
        assert!(request.messages.iter().all(|m| !m.content.contains("Alice earns")));

        let preview = service
            .preview(&bob, &bob_conv.id, Some("salary"))
            .await
            .unwrap();
        assert_eq!(preview.report.chunks_injected, 0);
    }

    #[tokio::test]
    async fn retrieval_disabled_skips_embedding() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let mut config = AppConfig::default();
        config.retrieval.enabled = false;
        let service = service_with(&store, provider.clone(), &config);
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        seed_chunk(&store, &alice.id, &conv.id, "Vacation is 25 days.").await;
        service.send(&alice, &conv.id, "Hello").await.unwrap();

        assert_eq!(*provider.embed_calls.lock().unwrap(), 0);
        assert_eq!(provider.last_request().messages.len(), 1);
    }

    #[tokio::test]
    async fn pinned_conversation_uses_pinned_budget() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        for _ in 0..3 {
            store
                .append_message(&conv.id, &alice.id, Role::User, &"a".repeat(2400))
                .await
                .unwrap();
        }
        service
            .update_settings(
                &alice,
                &conv.id,
                SettingsUpdate {
                    pinned: Some(true),
                    model: None,
                },
            )
            .await
            .unwrap();

        let reply = service.send(&alice, &conv.id, "short").await.unwrap();
        assert!(reply.context.pinned);
        assert_eq!(reply.context.budget, 1000);
        // 600 + 2 fits 1000; the next 600 does not.
        assert_eq!(reply.context.messages_included, 2);
    }

    #[tokio::test]
    async fn missing_fields_rejected() {
        let store = InMemoryStore::new();
        let service = service_with(&store, MockProvider::new("ok"), &AppConfig::default());
        let alice = user("alice");

        let err = service
            .send(&alice, &ConversationId::from(""), "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let err = service.send(&alice, &conv.id, "   ").await.unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[tokio::test]
    async fn unknown_or_foreign_conversation_is_not_found() {
        let store = InMemoryStore::new();
        let service = service_with(&store, MockProvider::new("ok"), &AppConfig::default());
        let alice = user("alice");
        let bob = user("bob");

        let err = service
            .send(&alice, &ConversationId::from("nope"), "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let err = service.send(&bob, &conv.id, "Hello").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(service.messages(&bob, &conv.id).await.is_err());
    }

    #[tokio::test]
    async fn provider_failure_propagates_after_user_message_saved() {
        let store = InMemoryStore::new();
        let service = service_with(&store, Arc::new(FailingProvider), &{
            let mut config = AppConfig::default();
            config.retrieval.enabled = false;
            config
        });
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let err = service.send(&alice, &conv.id, "Hello").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(!err.is_client_error());

        let stored = service.messages(&alice, &conv.id).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn embedding_unsupported_fails_turn_when_retrieval_enabled() {
        let store = InMemoryStore::new();
        let service = service_with(&store, Arc::new(FailingProvider), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let err = service.send(&alice, &conv.id, "Hello").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn preview_does_not_persist_or_complete() {
        let store = InMemoryStore::new();
        let provider = MockProvider::new("ok");
        let service = service_with(&store, provider.clone(), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        store
            .append_message(&conv.id, &alice.id, Role::User, "earlier")
            .await
            .unwrap();
        seed_chunk(&store, &alice.id, &conv.id, "Doc text.").await;

        let preview = service
            .preview(&alice, &conv.id, Some("question"))
            .await
            .unwrap();
        assert_eq!(preview.messages.len(), 2);
        assert_eq!(preview.report.chunks_injected, 1);

        let without_query = service.preview(&alice, &conv.id, None).await.unwrap();
        assert_eq!(without_query.messages.len(), 1);

        assert!(provider.requests.lock().unwrap().is_empty());
        assert_eq!(service.messages(&alice, &conv.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_settings_rejects_blank_model() {
        let store = InMemoryStore::new();
        let service = service_with(&store, MockProvider::new("ok"), &AppConfig::default());
        let alice = user("alice");

        let conv = service.create_conversation(&alice, None).await.unwrap();
        let err = service
            .update_settings(
                &alice,
                &conv.id,
                SettingsUpdate {
                    pinned: None,
                    model: Some(" ".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
