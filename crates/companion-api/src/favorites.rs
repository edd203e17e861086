use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use companion_types::api::{FavoriteRequest, FavoriteStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn add(
    State(state): State<AppState>,
    Json(req): Json<FavoriteRequest>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let added = state
        .db(move |db| {
            if db.get_character(&req.character_id)?.is_none() {
                return Ok(None);
            }
            db.add_favorite(&req.user_id, &req.character_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;

    let message = if added { "Added to favorites" } else { "Already in favorites" };
    Ok(Json(FavoriteStatus {
        favorited: true,
        message: Some(message.to_string()),
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<FavoriteRequest>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let removed = state
        .db(move |db| db.remove_favorite(&req.user_id, &req.character_id))
        .await?;
    let message = if removed { "Removed from favorites" } else { "Not in favorites" };
    Ok(Json(FavoriteStatus {
        favorited: false,
        message: Some(message.to_string()),
    }))
}

pub async fn check(
    State(state): State<AppState>,
    Path((user_id, character_id)): Path<(String, String)>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let favorited = state
        .db(move |db| db.is_favorite(&user_id, &character_id))
        .await?;
    Ok(Json(FavoriteStatus { favorited, message: None }))
}

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let favorites = state.db(move |db| db.list_favorites(&user_id)).await?;
    Ok(Json(json!({ "favorites": favorites })))
}
