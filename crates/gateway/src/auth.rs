//! Bearer token verification.
//!
//! - [`TokenAuthenticator`]: static token → user map from the config file
//! - [`RemoteAuthenticator`]: asks a GoTrue-compatible auth service
//!   (`GET {url}/user`) who the token belongs to

use async_trait::async_trait;
use orgchat_config::{AuthConfig, AuthMode};
use orgchat_core::error::Error;
use orgchat_core::{AuthenticatedUser, Authenticator, UserId};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Message returned for any rejected token.
const INVALID_USER: &str = "Invalid user";

pub struct TokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl TokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, user)| (token, UserId(user)))
                .collect(),
        }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    fn name(&self) -> &str {
        "tokens"
    }

    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, Error> {
        self.tokens
            .get(token)
            .map(|id| AuthenticatedUser {
                id: id.clone(),
                email: None,
            })
            .ok_or_else(|| Error::Unauthorized(INVALID_USER.into()))
    }
}

pub struct RemoteAuthenticator {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteAuthenticator {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[async_trait]
impl Authenticator for RemoteAuthenticator {
    fn name(&self) -> &str {
        "remote"
    }

    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, Error> {
        let url = format!("{}/user", self.base_url);
        let mut request = self.client.get(&url).bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Internal(format!("auth service unreachable: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::NOT_FOUND
        {
            debug!(%status, "Auth service rejected token");
            return Err(Error::Unauthorized(INVALID_USER.into()));
        }
        if !status.is_success() {
            warn!(%status, "Auth service returned error");
            return Err(Error::Internal(format!("auth service returned {status}")));
        }

        let user: RemoteUser = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("invalid auth service response: {e}")))?;

        Ok(AuthenticatedUser {
            id: UserId(user.id),
            email: user.email,
        })
    }
}

/// Build the authenticator selected by `[auth]`.
pub fn build_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, Error> {
    match config.mode {
        AuthMode::Tokens => {
            if config.tokens.is_empty() {
                warn!("No access tokens configured; every API request will be rejected");
            }
            Ok(Arc::new(TokenAuthenticator::new(
                config
                    .tokens
                    .iter()
                    .map(|(token, user)| (token.clone(), user.clone())),
            )))
        }
        AuthMode::Remote => {
            let url = config.remote_url.clone().ok_or_else(|| Error::Config {
                message: "auth.remote_url is required for remote auth".into(),
            })?;
            Ok(Arc::new(RemoteAuthenticator::new(
                url,
                config.remote_api_key.clone(),
            )))
        }
    }
}
