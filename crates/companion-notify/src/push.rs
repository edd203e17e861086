use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use companion_db::Database;
use companion_types::api::NotificationPayload;
use companion_types::models::PushSubscription;

use crate::encryption::{self, EncryptionError};

/// Seconds a push service should hold an undelivered message.
const PUSH_TTL_SECS: &str = "86400";
/// VAPID tokens may live at most 24 h; stay well under it.
const VAPID_TOKEN_SECS: u64 = 12 * 3600;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("subscription expired (status {0})")]
    Gone(u16),
    #[error("push service rejected message (status {0})")]
    Rejected(u16),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("VAPID signing failed: {0}")]
    Vapid(#[from] jsonwebtoken::errors::Error),
    #[error("payload encryption failed: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Transport for a single notification to a single browser subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, sub: &PushSubscription, payload: &NotificationPayload) -> Result<(), PushError>;
}

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key_pem: String,
    pub subject: String,
}

struct VapidSigner {
    public_key: String,
    key: EncodingKey,
    subject: String,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: u64,
    sub: &'a str,
}

/// Web Push over HTTP with VAPID (ES256) authentication. Payloads are JSON
/// encrypted for the subscription's keys with the `aes128gcm` coding.
pub struct WebPushSender {
    client: reqwest::Client,
    vapid: Option<VapidSigner>,
}

impl WebPushSender {
    pub fn new(vapid: Option<VapidConfig>) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let vapid = match vapid {
            Some(cfg) => Some(VapidSigner {
                key: EncodingKey::from_ec_pem(cfg.private_key_pem.as_bytes())?,
                public_key: cfg.public_key,
                subject: cfg.subject,
            }),
            None => {
                warn!("VAPID keys not configured; push services will likely reject deliveries");
                None
            }
        };

        Ok(Self { client, vapid })
    }

    fn authorization(&self, endpoint: &str) -> Result<Option<String>, PushError> {
        let Some(vapid) = &self.vapid else {
            return Ok(None);
        };
        let url = Url::parse(endpoint).map_err(|e| PushError::Endpoint(e.to_string()))?;
        let audience = url.origin().ascii_serialization();
        let exp = jsonwebtoken::get_current_timestamp() + VAPID_TOKEN_SECS;
        let claims = VapidClaims { aud: &audience, exp, sub: &vapid.subject };
        let token = encode(&Header::new(Algorithm::ES256), &claims, &vapid.key)?;
        Ok(Some(format!("vapid t={}, k={}", token, vapid.public_key)))
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, sub: &PushSubscription, payload: &NotificationPayload) -> Result<(), PushError> {
        let json = serde_json::to_vec(payload)?;
        let body = encryption::encrypt(&sub.p256dh, &sub.auth, &json)?;

        let mut request = self
            .client
            .post(&sub.endpoint)
            .header("TTL", PUSH_TTL_SECS)
            .header(reqwest::header::CONTENT_ENCODING, encryption::CONTENT_ENCODING)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        if let Some(auth) = self.authorization(&sub.endpoint)? {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let status = request.send().await?.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone(status.as_u16())),
            s => Err(PushError::Rejected(s.as_u16())),
        }
    }
}

/// Send `payload` to every active subscription of `user_id`.
///
/// Expired subscriptions are deactivated; other failures are logged and
/// swallowed. Returns how many subscriptions accepted the message.
pub async fn deliver(
    db: &Arc<Database>,
    sender: &dyn PushSender,
    user_id: &str,
    payload: &NotificationPayload,
) -> anyhow::Result<usize> {
    let subs = {
        let db = db.clone();
        let uid = user_id.to_string();
        tokio::task::spawn_blocking(move || db.active_subscriptions(&uid)).await??
    };

    let results = join_all(subs.iter().map(|sub| sender.send(sub, payload))).await;

    let mut accepted = 0;
    for (sub, result) in subs.iter().zip(results) {
        match result {
            Ok(()) => accepted += 1,
            Err(PushError::Gone(status)) => {
                debug!("Push endpoint gone ({}), deactivating {}", status, sub.id);
                let db = db.clone();
                let endpoint = sub.endpoint.clone();
                match tokio::task::spawn_blocking(move || db.deactivate_subscription(&endpoint)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Failed to deactivate subscription {}: {}", sub.id, e),
                    Err(e) => error!("spawn_blocking join error: {}", e),
                }
            }
            Err(e) => warn!("Push to {} failed: {}", sub.id, e),
        }
    }
    Ok(accepted)
}
