//! HTTP API gateway for orgchat.
//!
//! Exposes a health check and the authenticated `/api` routes for chat,
//! ingestion, conversation settings, and context preview.
//!
//! Built on Axum.

pub mod api;
pub mod auth;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use orgchat_chat::{ChatService, IngestService};
use orgchat_config::{AppConfig, GatewayConfig};
use orgchat_core::error::Error;
use orgchat_core::{Authenticator, Provider};
use orgchat_store::Stores;

use crate::api::ApiError;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub chat: ChatService,
    pub ingest: IngestService,
    pub authenticator: Arc<dyn Authenticator>,
}

impl GatewayState {
    /// Wire the services from config, stores, and provider.
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        provider: Arc<dyn Provider>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            chat: ChatService::from_config(
                config,
                stores.conversations.clone(),
                stores.documents.clone(),
                provider.clone(),
            ),
            ingest: IngestService::new(
                stores.conversations,
                stores.documents,
                stores.files,
                provider,
                config,
            ),
            authenticator,
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - Bearer authentication on all `/api` routes
/// - Per-token rate limiting on `/api` (disabled when the limit is 0)
/// - Request body size limit
/// - CORS
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    let mut api = api::api_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    if config.rate_limit_per_minute > 0 {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            Duration::from_secs(60),
        ));
        api = api.layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Provider, stores, and authenticator are built once here and shared by
/// every request.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = orgchat_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or("No default provider configured")?;
    let stores = orgchat_store::open(&config.store).await?;
    let authenticator = auth::build_authenticator(&config.auth)?;

    let state = Arc::new(GatewayState::new(&config, stores, provider, authenticator));
    let app = build_router(state, &config.gateway);

    let (default_budget, pinned_budget) = config.context.budgets();
    info!(
        addr = %addr,
        default_budget,
        pinned_budget,
        retrieval = config.retrieval.enabled,
        store = ?config.store.backend,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (the bearer token).
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Evict idle clients once the map grows large.
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rejects with 429 once a token exceeds its per-minute allowance.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let client_key = bearer_token(&req).unwrap_or("anonymous").to_string();

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(8).collect::<String>(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "success": false, "error": "Too many requests" })),
        )
            .into_response();
    }

    next.run(req).await
}

// --- Auth ---

fn bearer_token(req: &axum::extract::Request) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware for `/api`.
///
/// Requires `Authorization: Bearer <token>`; the verified user is placed in
/// the request extensions for handlers.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req).map(str::to_string) else {
        return ApiError(Error::Unauthorized("Missing access token".into())).into_response();
    };

    match state.authenticator.verify(&token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
