//! Identity collaborator
//!
//! Credential checks and token minting live in a separate service. The
//! server only forwards registration and login, and asks it to validate the
//! bearer token presented on upgrade.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The service answered and said no
    #[error("{0}")]
    Rejected(String),

    /// The service could not be reached or answered nonsense
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub message: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGrant {
    pub token: String,
    pub username: String,
    #[serde(default)]
    pub role: String,
}

/// Result of checking a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub valid: bool,
    #[serde(default, rename = "user_id")]
    pub identity: String,
    #[serde(default)]
    pub role: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an account
    async fn register(&self, credentials: &Credentials) -> Result<Registration>;

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant>;

    async fn validate(&self, token: &str) -> Result<TokenClaims>;
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// JSON-over-HTTP client for the identity service
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(IdentityError::Unavailable(format!("{}: {}", status, text)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorReply>(&text) {
                Ok(reply) if !reply.error.is_empty() => reply.error,
                Ok(reply) if !reply.message.is_empty() => reply.message,
                _ if !text.is_empty() => text,
                _ => status.to_string(),
            };
            return Err(IdentityError::Rejected(message));
        }

        response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("invalid reply: {}", e)))
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    async fn register(&self, credentials: &Credentials) -> Result<Registration> {
        self.post("/register", credentials).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant> {
        self.post("/login", credentials).await
    }

    async fn validate(&self, token: &str) -> Result<TokenClaims> {
        self.post("/validate", &serde_json::json!({ "token": token }))
            .await
    }
}
