#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use companion_api::auth::hash_password;
use companion_api::providers::{
    AiProvider, CheckoutProvider, CheckoutRequest, CheckoutSession, CheckoutStatus, IdentityProvider, ImageData,
    OAuthIdentity, ProviderError,
};
use companion_api::{ApiConfig, AppState, AppStateInner, router};
use companion_db::Database;
use companion_notify::{PushError, PushSender};
use companion_types::api::NotificationPayload;
use companion_types::models::{AdminRole, Message, PushSubscription};

pub const SUPER_EMAIL: &str = "root@admin.test";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct StubAi;

#[async_trait]
impl AiProvider for StubAi {
    async fn chat(&self, _system: &str, history: &[Message], user_message: &str) -> Result<String, ProviderError> {
        Ok(format!("echo({}): {}", history.len(), user_message))
    }

    async fn generate_image(&self, _prompt: &str) -> Result<ImageData, ProviderError> {
        Ok(ImageData { base64: "aW1hZ2U=".into(), mime_type: "image/png".into() })
    }

    async fn speech(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(b"ID3".to_vec())
    }
}

pub struct StubIdentity;

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn exchange(&self, session_id: &str) -> Result<Option<OAuthIdentity>, ProviderError> {
        if session_id != "good-session" {
            return Ok(None);
        }
        Ok(Some(OAuthIdentity {
            email: "social@example.com".into(),
            name: "Social".into(),
            picture: Some("https://img.test/s.png".into()),
            session_token: "sess-abc".into(),
        }))
    }
}

/// Every session it creates reports as paid when polled.
#[derive(Default)]
pub struct StubCheckout {
    created: AtomicUsize,
}

#[async_trait]
impl CheckoutProvider for StubCheckout {
    async fn create_session(&self, req: CheckoutRequest<'_>) -> Result<CheckoutSession, ProviderError> {
        assert!(req.success_url.contains("/payment/success?session_id="));
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let session_id = format!("cs_test_{}", n);
        Ok(CheckoutSession { url: format!("https://checkout.test/{}", session_id), session_id })
    }

    async fn session_status(&self, session_id: &str) -> Result<Option<CheckoutStatus>, ProviderError> {
        Ok(session_id.starts_with("cs_test_").then(|| CheckoutStatus {
            status: "complete".into(),
            payment_status: "paid".into(),
        }))
    }
}

/// Accepts every push and counts them.
#[derive(Default)]
pub struct CountingPush {
    pub sent: AtomicUsize,
}

#[async_trait]
impl PushSender for CountingPush {
    async fn send(&self, _sub: &PushSubscription, _payload: &NotificationPayload) -> Result<(), PushError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub fn app() -> TestApp {
    app_with_webhook_secret(None)
}

pub fn app_with_webhook_secret(secret: Option<&str>) -> TestApp {
    let db = Database::open_in_memory().unwrap();
    let hash = hash_password(ADMIN_PASSWORD).unwrap();
    db.create_admin(SUPER_EMAIL, "root", &hash, AdminRole::SuperAdmin).unwrap();

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        config: ApiConfig {
            jwt_secret: "test-secret".into(),
            vapid_public_key: "BPublicKeyForTests".into(),
            stripe_webhook_secret: secret.map(str::to_string),
            site_url: "https://companion.test".into(),
        },
        ai: Arc::new(StubAi),
        identity: Arc::new(StubIdentity),
        checkout: Arc::new(StubCheckout::default()),
        push: Arc::new(CountingPush::default()),
    });
    TestApp { router: router(state.clone()), state }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Reply {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply { status, headers, body, text }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.call(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    /// Sign up a user and return `(token, user_id)`.
    pub async fn signup(&self, email: &str) -> (String, String) {
        let reply = self
            .post(
                "/api/auth/signup",
                None,
                serde_json::json!({ "email": email, "username": "Tester", "password": "secret1" }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
        (
            reply.body["token"].as_str().unwrap().to_string(),
            reply.body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn admin_token(&self) -> String {
        let reply = self
            .post(
                "/api/admin/login",
                None,
                serde_json::json!({ "email": SUPER_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
        reply.body["token"].as_str().unwrap().to_string()
    }

    pub async fn first_character_id(&self) -> String {
        let reply = self.get("/api/characters", None).await;
        reply.body[0]["id"].as_str().unwrap().to_string()
    }
}
