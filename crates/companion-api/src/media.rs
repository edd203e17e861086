use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Value, json};
use tracing::info;

use companion_types::api::{
    ImageGenerateRequest, ImageResponse, MessageResponse, StandaloneImageRequest, VoiceGenerateRequest, VoiceResponse,
};

use crate::characters::OwnerQuery;
use crate::error::ApiError;
use crate::providers::openai::encode_base64;
use crate::state::AppState;

pub async fn voice(
    State(state): State<AppState>,
    Json(req): Json<VoiceGenerateRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("Text is required"));
    }
    let audio = state.ai.speech(&req.text, &req.voice).await?;
    Ok(Json(VoiceResponse {
        audio: encode_base64(&audio),
        format: "mp3".to_string(),
    }))
}

/// Image in the style of a catalog character; not persisted.
pub async fn character_image(
    State(state): State<AppState>,
    Json(req): Json<ImageGenerateRequest>,
) -> Result<Json<ImageResponse>, ApiError> {
    let character_id = req.character_id.clone();
    let character = state
        .db(move |db| db.get_character(&character_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;

    let prompt = format!(
        "{}. Character style: {}, {}",
        req.prompt,
        character.category.as_str(),
        character.personality
    );
    let image = state.ai.generate_image(&prompt).await?;
    Ok(Json(ImageResponse {
        image: image.base64,
        mime_type: image.mime_type,
    }))
}

pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<StandaloneImageRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt is required"));
    }

    let prompt = format!("{}, {} style", req.prompt.trim(), req.style);
    let image = state.ai.generate_image(&prompt).await?;

    let stored = state
        .db(move |db| db.insert_image(&req.user_id, req.prompt.trim(), &req.style, &image.base64, &image.mime_type))
        .await?;
    info!("Stored generated image {} for {}", stored.id, stored.user_id);
    Ok(Json(json!({ "image": stored })))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let images = state.db(move |db| db.list_user_images(&user_id)).await?;
    Ok(Json(json!({ "images": images })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = q.user_id.ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    if !state.db(move |db| db.delete_image(&id, &user_id)).await? {
        return Err(ApiError::not_found("Image not found"));
    }
    Ok(Json(MessageResponse::new("Image deleted successfully")))
}
