//! HTTP API for chat, ingestion, conversation settings, and context preview.
//!
//! Endpoints (all behind bearer auth):
//!
//! - `POST  /api/chat`                         — Run one chat turn
//! - `POST  /api/ingest`                       — Ingest an uploaded file
//! - `POST  /api/conversations`                — Create a conversation
//! - `PATCH /api/conversations/{id}`           — Pin/unpin or change model
//! - `GET   /api/conversations/{id}/messages`  — List stored messages
//! - `POST  /api/context/preview`              — Show the next assembled context
//!
//! Every response carries `success`. Failures are `{ "success": false,
//! "error": "..." }` with 400, 401, 404, or 500.

use axum::{
    Extension, Router,
    body::Bytes,
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use orgchat_chat::{AssemblyReport, ChatReply, IngestReport, IngestRequest};
use orgchat_core::error::Error;
use orgchat_core::{
    AuthenticatedUser, ConversationId, ConversationSettings, Message, Role, SettingsUpdate,
};

use crate::SharedState;

// ── Errors ────────────────────────────────────────────────────────────────

/// An error rendered as the uniform failure body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidInput(rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::MissingField(_) | Error::UnsupportedFormat(_) | Error::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.0.is_client_error() {
            warn!(%status, error = %self.0, "Request rejected");
            match &self.0 {
                Error::Unauthorized(m) => m.clone(),
                Error::MissingField(_) => "Missing data".to_string(),
                Error::UnsupportedFormat(_) => "Unsupported file type".to_string(),
                other => other.to_string(),
            }
        } else {
            error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

/// `{ "success": true, ...body }`
#[derive(Serialize)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> ApiResult<T> {
    Ok(Json(Success {
        success: true,
        body,
    }))
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingField(field.into()).into())
}

// ── Router ────────────────────────────────────────────────────────────────

/// Routes under `/api`. Auth is applied by the caller.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/ingest", post(ingest_handler))
        .route("/conversations", post(create_conversation_handler))
        .route("/conversations/{id}", patch(update_conversation_handler))
        .route("/conversations/{id}/messages", get(list_messages_handler))
        .route("/context/preview", post(preview_handler))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    user_message: Option<String>,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatReply> {
    let Json(payload) = payload?;
    let conversation_id = ConversationId(required(payload.conversation_id, "conversationId")?);
    let user_message = required(payload.user_message, "userMessage")?;

    info!(conversation = %conversation_id, user = %user.id, "chat request");
    ok(state.chat.send(&user, &conversation_id, &user_message).await?)
}

async fn ingest_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<IngestReport> {
    let Json(request) = payload?;
    ok(state.ingest.ingest(&user, request).await?)
}

#[derive(Debug, Default, Deserialize)]
struct CreateConversationRequest {
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationView {
    id: ConversationId,
    pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

impl From<ConversationSettings> for ConversationView {
    fn from(s: ConversationSettings) -> Self {
        Self {
            id: s.id,
            pinned: s.pinned,
            model: s.model,
        }
    }
}

#[derive(Serialize)]
struct ConversationResponse {
    conversation: ConversationView,
}

async fn create_conversation_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<(StatusCode, Json<Success<ConversationResponse>>), ApiError> {
    // An empty body means defaults.
    let request: CreateConversationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversationRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::InvalidInput(e.to_string()))?
    };
    let conversation = state.chat.create_conversation(&user, request.model).await?;
    Ok((
        StatusCode::CREATED,
        Json(Success {
            success: true,
            body: ConversationResponse {
                conversation: conversation.settings().into(),
            },
        }),
    ))
}

async fn update_conversation_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult<ConversationResponse> {
    let Json(update) = payload?;
    let settings = state
        .chat
        .update_settings(&user, &ConversationId(id), update)
        .await?;
    ok(ConversationResponse {
        conversation: settings.into(),
    })
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> ApiResult<MessagesResponse> {
    let messages = state.chat.messages(&user, &ConversationId(id)).await?;
    ok(MessagesResponse { messages })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

/// A role/content pair as submitted to the model.
#[derive(Serialize)]
struct ContextEntry {
    role: Role,
    content: String,
}

#[derive(Serialize)]
struct PreviewResponse {
    messages: Vec<ContextEntry>,
    report: AssemblyReport,
}

async fn preview_handler(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> ApiResult<PreviewResponse> {
    let Json(payload) = payload?;
    let conversation_id = ConversationId(required(payload.conversation_id, "conversationId")?);

    let assembled = state
        .chat
        .preview(&user, &conversation_id, payload.query.as_deref())
        .await?;

    ok(PreviewResponse {
        messages: assembled
            .messages
            .into_iter()
            .map(|m| ContextEntry {
                role: m.role,
                content: m.content,
            })
            .collect(),
        report: assembled.report,
    })
}
