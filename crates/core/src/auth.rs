//! Authentication trait — resolves a bearer credential to a user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user behind a verified access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Verify an access token. Unknown or expired tokens are
    /// [`Error::Unauthorized`]; failures reaching the auth backend are not.
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser, Error>;
}
