use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use companion_db::Database;
use companion_db::queries::NewTransaction;
use companion_types::api::{CheckoutRequest, CheckoutResponse, PaymentStatusResponse};
use companion_types::models::{PaymentMethod, PaymentTransaction};
use companion_types::plans::{self, find_plan};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::providers::{self, stripe::{StripeEventType, verify_webhook_signature}};
use crate::state::AppState;

const PAYPAL_NOTE: &str = "PayPal is running in mock mode; no real payment is taken";

pub async fn list_plans() -> Json<Value> {
    Json(json!({ "plans": plans::plan_map() }))
}

pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let plan = find_plan(&req.plan_id).ok_or_else(|| ApiError::bad_request("Invalid plan"))?;
    let method = PaymentMethod::parse(&req.payment_method)
        .ok_or_else(|| ApiError::bad_request("Unsupported payment method"))?;
    let origin = req.origin_url.trim_end_matches('/');

    let (session_id, checkout_url, note) = match method {
        PaymentMethod::Stripe => {
            let session = state
                .checkout
                .create_session(providers::CheckoutRequest {
                    plan_id: &req.plan_id,
                    plan_name: plan.name,
                    amount: plan.amount,
                    currency: plan.currency,
                    success_url: format!("{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}", origin),
                    cancel_url: format!("{}/subscription", origin),
                    user_id: &user.id,
                    user_email: &user.email,
                })
                .await?;
            (session.session_id, session.url, None)
        }
        PaymentMethod::Paypal => {
            let session_id = format!("PAYPAL-{}", Uuid::new_v4().simple().to_string().to_uppercase());
            let url = format!("{}/payment/success?session_id={}&payment_method=paypal", origin, session_id);
            (session_id, url, Some(PAYPAL_NOTE.to_string()))
        }
    };

    {
        let session_id = session_id.clone();
        let plan_id = req.plan_id.clone();
        state
            .db(move |db| {
                db.create_transaction(NewTransaction {
                    session_id: &session_id,
                    user_id: &user.id,
                    user_email: &user.email,
                    plan_id: &plan_id,
                    amount: plan.amount,
                    currency: plan.currency,
                    payment_method: method,
                })
            })
            .await?;
    }

    info!("Checkout {} opened via {}", session_id, method.as_str());
    Ok(Json(CheckoutResponse {
        checkout_url,
        session_id,
        payment_method: method.as_str().to_string(),
        note,
    }))
}

/// Store a provider status and start the subscription if this is the update
/// that marked the transaction paid.
fn settle(db: &Database, session_id: &str, status: &str, payment_status: &str) -> anyhow::Result<Option<PaymentTransaction>> {
    let Some((tx, newly_paid)) = db.update_transaction_status(session_id, status, payment_status)? else {
        return Ok(None);
    };
    if newly_paid {
        let days = find_plan(&tx.plan_id).map(|p| p.interval.days()).unwrap_or(30);
        db.activate_subscription(&tx.user_id, &tx.plan_id, tx.payment_method, &tx.session_id, days)?;
        info!("Subscription {} activated for {}", tx.plan_id, tx.user_id);
    }
    Ok(Some(tx))
}

pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let lookup = session_id.clone();
    let tx = state
        .db(move |db| db.get_transaction(&lookup))
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction not found"))?;

    let tx = if tx.payment_status == "paid" {
        tx
    } else {
        let polled = match tx.payment_method {
            // Mock approval: the return from the PayPal page counts as paid.
            PaymentMethod::Paypal => Some(("complete".to_string(), "paid".to_string())),
            PaymentMethod::Stripe => state
                .checkout
                .session_status(&session_id)
                .await?
                .map(|s| (s.status, s.payment_status)),
        };
        match polled {
            Some((status, payment_status)) => state
                .db(move |db| settle(db, &session_id, &status, &payment_status))
                .await?
                .unwrap_or(tx),
            None => tx,
        }
    };

    Ok(Json(PaymentStatusResponse {
        session_id: tx.session_id,
        status: tx.status,
        payment_status: tx.payment_status,
        amount: tx.amount,
        currency: tx.currency,
        plan_id: tx.plan_id,
    }))
}

pub async fn user_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let current = state.db(move |db| db.current_subscription(&user.id)).await?;
    Ok(Json(match current {
        Some(sub) => json!({ "has_subscription": true, "subscription": sub }),
        None => json!({ "has_subscription": false, "subscription": { "plan_id": "free", "status": "active" } }),
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let transactions = state.db(move |db| db.user_transactions(&user.id)).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    kind: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: StripeSessionObject,
}

#[derive(Deserialize)]
struct StripeSessionObject {
    id: String,
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if let Some(secret) = state.config.stripe_webhook_secret.as_deref() {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;
        if !verify_webhook_signature(&body, signature, secret) {
            warn!("Rejected Stripe webhook with bad signature");
            return Err(ApiError::bad_request("Invalid signature"));
        }
    }

    let event: StripeEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid payload: {}", e)))?;
    let session_id = event.data.object.id;

    match StripeEventType::from(event.kind.as_str()) {
        StripeEventType::CheckoutSessionCompleted => {
            state.db(move |db| settle(db, &session_id, "complete", "paid")).await?;
        }
        StripeEventType::CheckoutSessionExpired => {
            state.db(move |db| settle(db, &session_id, "expired", "unpaid")).await?;
        }
        StripeEventType::Unknown(kind) => {
            info!("Ignoring Stripe event {}", kind);
        }
    }
    Ok(Json(json!({ "received": true })))
}
