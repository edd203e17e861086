use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

const INBOX_LIMIT: u32 = 50;

pub async fn active(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let announcements = state.db(|db| db.list_announcements(true)).await?;
    Ok(Json(json!({ "announcements": announcements })))
}

/// The user's own in-app notifications merged with broadcasts, newest first.
pub async fn inbox(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let notifications = state
        .db(move |db| db.notifications_for_user(&user_id, INBOX_LIMIT))
        .await?;
    Ok(Json(json!({ "notifications": notifications })))
}
