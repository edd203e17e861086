use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use tracing::{info, warn};

use companion_db::queries::NewCharacter;
use companion_types::api::{CharacterEnvelope, CharacterList, CreateCharacterRequest, MessageResponse};
use companion_types::models::{Character, CharacterCategory};

use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_AVATAR: &str = "/avatars/default.jpg";

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<CategoryQuery>,
) -> Result<Json<Vec<Character>>, ApiError> {
    let category = match q.category.as_deref() {
        None | Some("") => None,
        // An unknown category matches nothing.
        Some(raw) => match CharacterCategory::parse(raw) {
            Some(c) => Some(c),
            None => return Ok(Json(Vec::new())),
        },
    };
    let characters = state.db(move |db| db.list_characters(category)).await?;
    Ok(Json(characters))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Character>, ApiError> {
    state
        .db(move |db| db.get_character(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Character not found"))
}

pub async fn get_custom(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Character>, ApiError> {
    state
        .db(move |db| db.get_custom_character(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Custom character not found"))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCharacterRequest>,
) -> Result<Json<CharacterEnvelope>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }

    let avatar_url = match req.avatar_prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(prompt) => match state.ai.generate_image(prompt).await {
            Ok(image) => format!("data:{};base64,{}", image.mime_type, image.base64),
            Err(e) => {
                warn!("Avatar generation failed, using default: {}", e);
                DEFAULT_AVATAR.to_string()
            }
        },
        None => DEFAULT_AVATAR.to_string(),
    };

    let character = state
        .db(move |db| {
            db.create_custom_character(NewCharacter {
                user_id: &req.user_id,
                name: req.name.trim(),
                age: req.age,
                personality: &req.personality,
                description: &req.description,
                occupation: req.occupation.as_deref(),
                traits: &req.traits,
                avatar_url: &avatar_url,
            })
        })
        .await?;

    info!("Custom character {} created by {}", character.id, character.user_id.as_deref().unwrap_or("-"));
    Ok(Json(CharacterEnvelope { character }))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<CharacterList>, ApiError> {
    let characters = state.db(move |db| db.list_user_characters(&user_id)).await?;
    Ok(Json(CharacterList { characters }))
}

pub async fn delete_custom(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OwnerQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = q.user_id.ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let deleted = state
        .db(move |db| db.delete_custom_character(&id, Some(&user_id)))
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Character not found or not owned by user"));
    }
    Ok(Json(MessageResponse::new("Character deleted successfully")))
}
