use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use companion_db::queries::MESSAGE_CONTEXT_WINDOW;
use companion_types::api::{ChatSendRequest, ChatSendResponse};
use companion_types::models::{Character, Sender, chat_id};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

pub fn system_prompt(character: &Character) -> String {
    format!(
        "You are {}, an AI companion. {} Your traits: {}. Be warm, engaging, and conversational. \
         Keep responses concise but meaningful.",
        character.name,
        character.personality,
        character.traits.join(", ")
    )
}

pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<ChatSendRequest>,
) -> Result<Json<ChatSendResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }

    let conversation = chat_id(&req.user_id, &req.character_id);
    let (character, history) = {
        let character_id = req.character_id.clone();
        let conversation = conversation.clone();
        state
            .db(move |db| {
                let Some(character) = db.get_character(&character_id)? else {
                    return Ok(None);
                };
                let history = db.recent_messages(&conversation, MESSAGE_CONTEXT_WINDOW)?;
                Ok(Some((character, history)))
            })
            .await?
            .ok_or_else(|| ApiError::not_found("Character not found"))?
    };

    debug!("Chat {} with {} prior messages", conversation, history.len());
    let reply = state.ai.chat(&system_prompt(&character), &history, &req.message).await?;

    let ai_message = state
        .db(move |db| {
            db.insert_message(&req.user_id, &req.character_id, Sender::User, &req.message)?;
            let ai = db.insert_message(&req.user_id, &req.character_id, Sender::Ai, &reply)?;
            db.touch_user(&req.user_id)?;
            Ok(ai)
        })
        .await?;

    Ok(Json(ChatSendResponse {
        response: ai_message.content,
        message_id: ai_message.id,
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Path(character_id): Path<String>,
    Query(q): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let conversation = chat_id(&q.user_id, &character_id);
    let messages = state.db(move |db| db.chat_history(&conversation)).await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn my_chats(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    let chats = state.db(move |db| db.user_chats(&q.user_id)).await?;
    Ok(Json(json!({ "chats": chats })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use companion_types::models::CharacterCategory;

    #[test]
    fn prompt_lists_traits() {
        let character = Character {
            id: "c1".into(),
            name: "Mia".into(),
            age: 24,
            personality: "Cheerful and curious.".into(),
            traits: vec!["playful".into(), "kind".into()],
            category: CharacterCategory::Girls,
            avatar_url: "/a.jpg".into(),
            description: "d".into(),
            occupation: None,
            is_custom: false,
            user_id: None,
            created_at: Utc::now(),
        };
        let prompt = system_prompt(&character);
        assert!(prompt.starts_with("You are Mia"));
        assert!(prompt.contains("Cheerful and curious."));
        assert!(prompt.contains("playful, kind"));
    }
}
