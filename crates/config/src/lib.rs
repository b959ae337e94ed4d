//! Configuration loading, validation, and management for orgchat.
//!
//! Loads configuration from `~/.orgchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Context budgets and the retrieval toggle live here so that the chat
//! endpoint's behavior is selected by configuration, not by code path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Largest number of retrieval chunks a single request may inject.
pub const MAX_MATCH_COUNT: usize = 20;

/// The root configuration structure.
///
/// Maps directly to `~/.orgchat/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chat completion defaults
    #[serde(default)]
    pub chat: ChatConfig,

    /// Context window budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Retrieval-augmented context injection
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Persistence backend
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Access token verification
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("chat", &self.chat)
            .field("context", &self.context)
            .field("retrieval", &self.retrieval)
            .field("ingest", &self.ingest)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP timeout for completion and embedding calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used when a conversation has none set
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per reply; unset lets the provider decide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Named budget pairs. `Custom` reads both numbers from the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetProfile {
    /// default 2000, pinned 1000
    #[default]
    Compact,
    /// default 4096, pinned 2048
    Extended,
    Custom,
}

impl BudgetProfile {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compact" => Some(Self::Compact),
            "extended" => Some(Self::Extended),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub profile: BudgetProfile,

    /// Budget for unpinned conversations (only read for `custom`)
    #[serde(default = "default_budget")]
    pub default_budget: usize,

    /// Budget for pinned conversations (only read for `custom`)
    #[serde(default = "default_pinned_budget")]
    pub pinned_budget: usize,
}

fn default_budget() -> usize {
    2000
}
fn default_pinned_budget() -> usize {
    1000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            profile: BudgetProfile::default(),
            default_budget: default_budget(),
            pinned_budget: default_pinned_budget(),
        }
    }
}

impl ContextConfig {
    /// The effective `(default, pinned)` budget pair.
    pub fn budgets(&self) -> (usize, usize) {
        match self.profile {
            BudgetProfile::Compact => (2000, 1000),
            BudgetProfile::Extended => (4096, 2048),
            BudgetProfile::Custom => (self.default_budget, self.pinned_budget),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Inject matching document chunks into the context
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Minimum cosine similarity of a matched chunk
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Maximum chunks per request
    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Text placed before the joined chunks in the injected system entry
    #[serde(default = "default_preamble")]
    pub preamble: String,

    /// Separator between chunks
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_true() -> bool {
    true
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_match_threshold() -> f32 {
    0.78
}
fn default_match_count() -> usize {
    3
}
fn default_preamble() -> String {
    "You can refer to the following document context when answering the user:\n\n".into()
}
fn default_separator() -> String {
    "\n---\n".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_model: default_embedding_model(),
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            preamble: default_preamble(),
            separator: default_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target chunk size in characters
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Chunks per embedding request
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_max_chunk_chars() -> usize {
    500
}
fn default_embed_batch_size() -> usize {
    64
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Public base URL of the file storage service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,

    /// Bucket that holds uploaded documents
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Create the tables and match function on startup (local databases only)
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}
fn default_bucket() -> String {
    "orgchat-docs".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            storage_url: None,
            bucket: default_bucket(),
            run_migrations: false,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("database_url", &redact(&self.database_url))
            .field("max_connections", &self.max_connections)
            .field("storage_url", &self.storage_url)
            .field("bucket", &self.bucket)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Requests per minute per access token; 0 disables the limiter
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_rate_limit() -> usize {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Static token → user ID map from this file
    #[default]
    Tokens,
    /// Verify against a GoTrue-compatible `/user` endpoint
    Remote,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// Access token → user ID
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// API key sent alongside the user's token to the auth service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .field("remote_url", &self.remote_url)
            .field("remote_api_key", &redact(&self.remote_api_key))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.orgchat/config.toml).
    ///
    /// Environment overrides:
    /// - `ORGCHAT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `ORGCHAT_MODEL`
    /// - `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key =
                lookup("ORGCHAT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("ORGCHAT_MODEL") {
            self.chat.default_model = model;
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".orgchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.temperature < 0.0 || self.chat.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let (default_budget, pinned_budget) = self.context.budgets();
        if default_budget == 0 || pinned_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context budgets must be greater than 0".into(),
            ));
        }

        if self.retrieval.match_count == 0 || self.retrieval.match_count > MAX_MATCH_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.match_count must be between 1 and {MAX_MATCH_COUNT}"
            )));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.match_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.match_threshold must be between -1.0 and 1.0".into(),
            ));
        }

        if self.ingest.max_chunk_chars == 0 || self.ingest.embed_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.max_chunk_chars and ingest.embed_batch_size must be > 0".into(),
            ));
        }

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::ValidationError(
                "store.database_url (or DATABASE_URL) is required for the postgres backend"
                    .into(),
            ));
        }

        if self.auth.mode == AuthMode::Remote && self.auth.remote_url.is_none() {
            return Err(ConfigError::ValidationError(
                "auth.remote_url is required when auth.mode = \"remote\"".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
