//! Clients for the third-party services the API forwards to.
//!
//! Each concern is a trait so the router can be exercised with in-process
//! stubs; the real implementations talk HTTP through `reqwest`.

pub mod oauth;
pub mod openai;
pub mod stripe;

use async_trait::async_trait;
use thiserror::Error;

use companion_types::models::Message;

pub use oauth::SessionExchangeClient;
pub use openai::OpenAiClient;
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Base64 image as returned to clients.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub base64: String,
    pub mime_type: String,
}

/// Chat completion, image generation and text-to-speech.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Reply to `user_message` given a system prompt and the prior turns, oldest first.
    async fn chat(&self, system_prompt: &str, history: &[Message], user_message: &str) -> Result<String, ProviderError>;

    async fn generate_image(&self, prompt: &str) -> Result<ImageData, ProviderError>;

    /// MP3 bytes.
    async fn speech(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Identity behind a social-login session id.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub session_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when the auth service rejects the session id.
    async fn exchange(&self, session_id: &str) -> Result<Option<OAuthIdentity>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub plan_id: &'a str,
    pub plan_name: &'a str,
    pub amount: f64,
    pub currency: &'a str,
    pub success_url: String,
    pub cancel_url: String,
    pub user_id: &'a str,
    pub user_email: &'a str,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutStatus {
    pub status: String,
    pub payment_status: String,
}

/// Hosted card checkout.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, req: CheckoutRequest<'_>) -> Result<CheckoutSession, ProviderError>;

    /// `Ok(None)` when the provider does not know the session.
    async fn session_status(&self, session_id: &str) -> Result<Option<CheckoutStatus>, ProviderError>;
}

/// Builds the shared outbound client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Turns a non-2xx response into `ProviderError::Upstream`.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Upstream { status, body })
}
