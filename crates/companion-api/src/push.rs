//! Browser push: subscriptions, preferences and notification generation.
//!
//! Eligibility and content selection live in `companion_notify`; these handlers
//! only load the user and persist the outcome.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use companion_notify::compose::{self, Composed, Decision};
use companion_notify::scheduler::INACTIVITY_THRESHOLD_HOURS;
use companion_notify::{deliver, templates};
use companion_types::api::{
    GenerateNotificationResponse, InactiveUser, MessageResponse, PreferenceUpdateRequest, PushSubscribeRequest,
};
use companion_types::models::{Frequency, NotificationPreference, NotificationType};

use crate::error::ApiError;
use crate::middleware::{AuthUser, resolve_user};
use crate::state::AppState;

const HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub notification_type: Option<String>,
}

pub async fn vapid_public_key(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "publicKey": state.config.vapid_public_key }))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PushSubscribeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.endpoint.trim().is_empty() {
        return Err(ApiError::bad_request("Endpoint is required"));
    }
    state
        .db(move |db| db.upsert_subscription(&user.id, &req.endpoint, &req.keys.p256dh, &req.keys.auth))
        .await?;
    Ok(Json(MessageResponse::new("Subscribed to push notifications")))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, ApiError> {
    let n = state.db(move |db| db.deactivate_user_subscriptions(&user.id)).await?;
    info!("Deactivated {} push subscription(s)", n);
    Ok(Json(MessageResponse::new("Unsubscribed from push notifications")))
}

pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<NotificationPreference>, ApiError> {
    let pref = state.db(move |db| db.get_preferences(&user_id)).await?;
    Ok(Json(pref.unwrap_or_default()))
}

pub async fn set_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<PreferenceUpdateRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let frequency = Frequency::parse(&req.frequency)
        .ok_or_else(|| ApiError::bad_request("Frequency must be low, medium or high"))?;
    let hour = |h: i64| u8::try_from(h).ok().filter(|h| *h <= 23);
    let (Some(quiet_hours_start), Some(quiet_hours_end)) = (hour(req.quiet_hours_start), hour(req.quiet_hours_end))
    else {
        return Err(ApiError::bad_request("Quiet hours must be between 0 and 23"));
    };

    let pref = NotificationPreference {
        enabled: req.enabled,
        frequency,
        quiet_hours_start,
        quiet_hours_end,
    };
    state.db(move |db| db.set_preferences(&user_id, &pref)).await?;
    Ok(Json(MessageResponse::new("Preferences updated")))
}

/// Run the eligibility filter on demand. A positive decision is recorded
/// immediately because the caller delivers the notification itself.
pub async fn generate_notification(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<GenerateQuery>,
) -> Result<Json<GenerateNotificationResponse>, ApiError> {
    let kind = match q.notification_type.as_deref() {
        None => NotificationType::Random,
        Some(raw) => NotificationType::parse(raw)
            .ok_or_else(|| ApiError::bad_request("notification_type must be random or inactivity"))?,
    };

    let decision = state
        .db(move |db| {
            let Some(user) = db.get_user_by_id(&user_id)? else {
                return Ok(None);
            };
            let decision = compose::decide(db, &user, kind, Utc::now())?;
            if let Decision::Send(composed) = &decision {
                compose::record(db, &user.id, composed, kind)?;
            }
            Ok(Some(decision))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(match decision {
        Decision::Send(composed) => GenerateNotificationResponse {
            send: true,
            message: None,
            notification: Some(composed.payload),
        },
        Decision::Skip(reason) => GenerateNotificationResponse {
            send: false,
            message: Some(reason.to_string()),
            notification: None,
        },
    }))
}

pub async fn notification_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let history = state
        .db(move |db| db.notification_history(&user_id, HISTORY_LIMIT))
        .await?;
    Ok(Json(json!({ "history": history })))
}

pub async fn check_inactivity(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cutoff = Utc::now() - chrono::Duration::hours(INACTIVITY_THRESHOLD_HOURS);
    let users = state.db(move |db| db.inactive_subscribers(cutoff)).await?;
    let inactive_users: Vec<InactiveUser> = users
        .into_iter()
        .map(|u| InactiveUser {
            user_id: u.id,
            username: u.username,
            last_active: u.last_active,
        })
        .collect();
    Ok(Json(json!({ "inactive_users": inactive_users })))
}

/// Anonymous callers get a successful no-op.
pub async fn update_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(user) = resolve_user(&state, &headers).await? else {
        return Ok(Json(MessageResponse::new("No authenticated user")));
    };
    state.db(move |db| db.touch_user(&user.id)).await?;
    Ok(Json(MessageResponse::new("Activity updated")))
}

/// Deliver one notification right away, ignoring preferences and caps.
pub async fn send_test(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let user_id = auth.id.clone();
    let composed = state
        .db(move |db| {
            let Some(user) = db.get_user_by_id(&user_id)? else {
                return Ok(None);
            };
            let tiers = vec![db.conversation_partners(&user.id)?, db.catalog_character_ids()?];
            let mut rng = rand::rng();
            let Some(character) = compose::pick_character(&mut rng, tiers, |id| db.get_character(id))? else {
                return Ok(None);
            };
            let body = templates::pick_message(&mut rng, NotificationType::Random, &user.username);
            let payload = compose::build_payload(&character, body, NotificationType::Random);
            Ok(Some(Composed { character, payload }))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("No character available"))?;

    let sent = deliver(&state.db, state.push.as_ref(), &auth.id, &composed.payload).await?;
    if sent > 0 {
        let user_id = auth.id.clone();
        state
            .db(move |db| compose::record(db, &user_id, &composed, NotificationType::Random))
            .await?;
    }
    info!("Test notification for {} reached {} subscription(s)", auth.id, sent);
    Ok(Json(json!({ "sent": sent })))
}
