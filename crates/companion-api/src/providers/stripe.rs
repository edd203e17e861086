use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::Sha256;
use tracing::info;

use super::{CheckoutProvider, CheckoutRequest, CheckoutSession, CheckoutStatus, ProviderError, check_status, http_client};

type HmacSha256 = Hmac<Sha256>;

/// Stripe Checkout through the REST API.
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
}

/// Stripe webhook event kinds the API reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    CheckoutSessionExpired,
    Unknown(String),
}

impl From<&str> for StripeEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "checkout.session.expired" => Self::CheckoutSessionExpired,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl StripeClient {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(30)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::NotConfigured("STRIPE_API_KEY"))
    }
}

/// Amount in the currency's minor unit.
fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_session(&self, req: CheckoutRequest<'_>) -> Result<CheckoutSession, ProviderError> {
        let cents = to_cents(req.amount).to_string();
        let form = [
            ("mode", "payment"),
            ("success_url", req.success_url.as_str()),
            ("cancel_url", req.cancel_url.as_str()),
            ("customer_email", req.user_email),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", req.currency),
            ("line_items[0][price_data][unit_amount]", cents.as_str()),
            ("line_items[0][price_data][product_data][name]", req.plan_name),
            ("metadata[user_id]", req.user_id),
            ("metadata[plan_id]", req.plan_id),
        ];

        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(self.key()?, Some(""))
            .form(&form)
            .send()
            .await?;
        let session: SessionObject = check_status(resp).await?.json().await?;
        let url = session
            .url
            .ok_or_else(|| ProviderError::Malformed("checkout session without url".into()))?;

        info!("Stripe checkout session {} created for plan {}", session.id, req.plan_id);
        Ok(CheckoutSession { session_id: session.id, url })
    }

    async fn session_status(&self, session_id: &str) -> Result<Option<CheckoutStatus>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .basic_auth(self.key()?, Some(""))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let session: SessionObject = check_status(resp).await?.json().await?;
        Ok(Some(CheckoutStatus {
            status: session.status.unwrap_or_else(|| "open".into()),
            payment_status: session.payment_status.unwrap_or_else(|| "unpaid".into()),
        }))
    }
}

/// Largest accepted distance, in seconds, between a signature's `t` and now.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw body.
/// Signatures older or newer than the tolerance are rejected.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, webhook_secret: &str) -> bool {
    verify_webhook_signature_at(payload, signature, webhook_secret, chrono::Utc::now().timestamp())
}

fn verify_webhook_signature_at(payload: &[u8], signature: &str, webhook_secret: &str, now: i64) -> bool {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in signature.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = Some(t),
            Some(("v1", sig)) => candidates.push(sig),
            _ => {}
        }
    }
    let Some(timestamp) = timestamp else {
        return false;
    };
    let Ok(signed_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if now.abs_diff(signed_at) > WEBHOOK_TOLERANCE_SECS.unsigned_abs() {
        return false;
    }

    candidates.into_iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    })
}
