//! End-to-end integration tests for orgchat.
//!
//! These tests drive the full HTTP gateway against the in-memory store and a
//! scripted provider, checking what actually reaches the model.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use orgchat_config::AppConfig;
use orgchat_core::error::ProviderError;
use orgchat_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use orgchat_core::{Message, Role};
use orgchat_gateway::{GatewayState, build_router};
use orgchat_store::{InMemoryStore, Stores};
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replies from a script in sequence and records every request.
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedProvider exhausted");
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vec![0.6, 0.8]).collect(),
            model: request.model,
            usage: None,
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    app: Router,
    store: InMemoryStore,
    provider: Arc<ScriptedProvider>,
}

fn harness(config: AppConfig, replies: &[&str]) -> Harness {
    let mut config = config;
    config.auth.tokens.insert("tok-alice".into(), "alice".into());
    let store = InMemoryStore::new();
    let provider = ScriptedProvider::new(replies);
    let authenticator = orgchat_gateway::auth::build_authenticator(&config.auth).unwrap();
    let state = Arc::new(GatewayState::new(
        &config,
        Stores::in_memory(store.clone()),
        provider.clone(),
        authenticator,
    ));
    Harness {
        app: build_router(state, &config.gateway),
        store,
        provider,
    }
}

impl Harness {
    async fn call(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer tok-alice")
            .header("content-type", "application/json");
        let req = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn new_conversation(&self) -> String {
        let (status, body) = self
            .call("POST", "/api/conversations", Some(serde_json::json!({})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["conversation"]["id"].as_str().unwrap().to_string()
    }

    async fn chat(&self, conversation: &str, text: &str) -> serde_json::Value {
        let (status, body) = self
            .call(
                "POST",
                "/api/chat",
                Some(serde_json::json!({"conversationId": conversation, "userMessage": text})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "chat failed: {body}");
        body
    }
}

/// A message body of exactly `tokens` estimated tokens.
fn text_of(tokens: usize, tag: char) -> String {
    tag.to_string().repeat(tokens * 4)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn multi_turn_history_reaches_model_in_order() {
    let h = harness(AppConfig::default(), &["one", "two"]);
    let conv = h.new_conversation().await;

    let first = h.chat(&conv, "Hello").await;
    assert_eq!(first["assistantMessage"]["content"], "one");

    h.chat(&conv, "And again").await;
    let request = h.provider.last_request();
    let turns: Vec<(Role, &str)> = request
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Role::User, "Hello"),
            (Role::Assistant, "one"),
            (Role::User, "And again"),
        ]
    );

    let (_, listed) = h
        .call("GET", &format!("/api/conversations/{conv}/messages"), None)
        .await;
    assert_eq!(listed["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn long_history_is_trimmed_to_budget() {
    let mut config = AppConfig::default();
    config.retrieval.enabled = false;
    let h = harness(config, &["a", "b", "c", "d"]);
    let conv = h.new_conversation().await;

    // Each turn stores a 600-token user message and a 1-token reply.
    for tag in ['w', 'x', 'y'] {
        h.chat(&conv, &text_of(600, tag)).await;
    }
    let body = h.chat(&conv, &text_of(600, 'z')).await;

    // Newest first: z(600) + c(1) + y(600) + b(1) = 1202, then x(600) makes 1802,
    // then a(1) makes 1803 and w(600) would exceed 2000.
    assert_eq!(body["context"]["historyTokens"], 1803);
    assert_eq!(body["context"]["messagesDropped"], 1);
    let request = h.provider.last_request();
    assert_eq!(request.messages.len(), 6);
    assert_eq!(request.messages[0].content, "a");
    assert!(request.messages[5].content.starts_with('z'));
}

#[tokio::test]
async fn pinning_halves_the_window() {
    let mut config = AppConfig::default();
    config.retrieval.enabled = false;
    let h = harness(config, &["a", "b"]);
    let conv = h.new_conversation().await;

    let (status, _) = h
        .call(
            "PATCH",
            &format!("/api/conversations/{conv}"),
            Some(serde_json::json!({"pinned": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    h.chat(&conv, &text_of(600, 'p')).await;
    let body = h.chat(&conv, &text_of(600, 'q')).await;

    assert_eq!(body["context"]["budget"], 1000);
    assert_eq!(body["context"]["pinned"], true);
    // q(600) + a(1) fit; p(600) would reach 1201.
    assert_eq!(h.provider.last_request().messages.len(), 2);
}

#[tokio::test]
async fn ingested_document_is_injected_before_history() {
    let h = harness(AppConfig::default(), &["Fridays."]);
    let conv = h.new_conversation().await;
    h.store
        .put_file(
            "alice/handbook.md",
            "Remote work is allowed on Fridays. Lunch is at noon.",
        )
        .await;

    let (status, body) = h
        .call(
            "POST",
            "/api/ingest",
            Some(serde_json::json!({
                "filePath": "alice/handbook.md",
                "conversationId": conv,
                "fileName": "handbook.md"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], 1);

    let body = h.chat(&conv, "When can I work from home?").await;
    assert_eq!(body["context"]["chunksInjected"], 1);

    let request = h.provider.last_request();
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[0].role, Role::System);
    assert!(request.messages[0].content.contains("Remote work is allowed on Fridays."));
    assert_eq!(request.messages[1].content, "When can I work from home?");
}

#[tokio::test]
async fn preview_matches_next_turn_without_calling_model() {
    let h = harness(AppConfig::default(), &["reply"]);
    let conv = h.new_conversation().await;
    h.chat(&conv, "first").await;

    let (status, body) = h
        .call(
            "POST",
            "/api/context/preview",
            Some(serde_json::json!({"conversationId": conv})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["report"]["historyTokens"], 4);
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let h = harness(AppConfig::default(), &[]);
    let (status, body) = h
        .call(
            "POST",
            "/api/chat",
            Some(serde_json::json!({"conversationId": "missing", "userMessage": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(h.provider.calls(), 0);
}
