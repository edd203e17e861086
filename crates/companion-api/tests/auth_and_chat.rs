mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use common::app;

#[tokio::test]
async fn signup_then_login_returns_same_user() {
    let app = app();
    let (_, user_id) = app.signup("alice@example.com").await;

    let login = app
        .post("/api/auth/login", None, json!({ "email": "alice@example.com", "password": "secret1" }))
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["id"], user_id.as_str());
    assert!(login.body["user"].get("password_hash").is_none());

    let bad = app
        .post("/api/auth/login", None, json!({ "email": "alice@example.com", "password": "wrong!" }))
        .await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
    assert!(bad.body["detail"].is_string());
}

#[tokio::test]
async fn duplicate_or_short_signup_is_rejected() {
    let app = app();
    app.signup("dup@example.com").await;

    let dup = app
        .post(
            "/api/auth/signup",
            None,
            json!({ "email": "dup@example.com", "username": "Again", "password": "secret1" }),
        )
        .await;
    assert_eq!(dup.status, StatusCode::BAD_REQUEST);

    let short = app
        .post(
            "/api/auth/signup",
            None,
            json!({ "email": "short@example.com", "username": "S", "password": "12345" }),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn me_requires_a_token() {
    let app = app();
    let (token, user_id) = app.signup("me@example.com").await;

    let me = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"], user_id.as_str());

    assert_eq!(app.get("/api/auth/me", None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.get("/api/auth/me", Some("garbage")).await.status, StatusCode::UNAUTHORIZED);

    // Admin tokens are not user tokens.
    let admin = app.admin_token().await;
    assert_eq!(app.get("/api/auth/me", Some(&admin)).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn social_login_sets_session_cookie() {
    let app = app();

    let rejected = app
        .post("/api/auth/google/session", None, json!({ "session_id": "bad-session" }))
        .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);

    let ok = app
        .post("/api/auth/google/session", None, json!({ "session_id": "good-session" }))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["user"]["auth_provider"], "google");
    let cookie = ok.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(cookie.starts_with("session_token=sess-abc"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=None"));

    let me = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, "session_token=sess-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "social@example.com");

    let logout = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/logout")
                .header(header::COOKIE, "session_token=sess-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(logout.body["message"], "Logged out successfully");

    let after = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, "session_token=sess-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn catalog_lists_defaults_and_filters_by_category() {
    let app = app();
    let all = app.get("/api/characters", None).await;
    assert_eq!(all.body.as_array().unwrap().len(), 25);

    let anime = app.get("/api/characters?category=Anime", None).await;
    assert_eq!(anime.body.as_array().unwrap().len(), 8);

    assert_eq!(app.get("/api/characters/nope", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_characters_are_owned() {
    let app = app();
    let (_, user_id) = app.signup("maker@example.com").await;

    let created = app
        .post(
            "/api/characters/create",
            None,
            json!({
                "user_id": user_id,
                "name": "Nova",
                "age": 27,
                "personality": "Calm",
                "description": "A stargazer",
                "traits": ["calm", "curious"],
                "avatar_prompt": "portrait of a stargazer"
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK);
    let character = &created.body["character"];
    assert_eq!(character["is_custom"], true);
    assert_eq!(character["category"], "Custom");
    assert!(character["avatar_url"].as_str().unwrap().starts_with("data:image/png;base64,"));
    let id = character["id"].as_str().unwrap().to_string();

    let mine = app.get(&format!("/api/characters/my/{}", user_id), None).await;
    assert_eq!(mine.body["characters"].as_array().unwrap().len(), 1);

    let stranger = app
        .call(Method::DELETE, &format!("/api/characters/custom/{}?user_id=someone-else", id), None, None)
        .await;
    assert_eq!(stranger.status, StatusCode::NOT_FOUND);

    let owner = app
        .call(Method::DELETE, &format!("/api/characters/custom/{}?user_id={}", id, user_id), None, None)
        .await;
    assert_eq!(owner.status, StatusCode::OK);
    assert_eq!(app.get(&format!("/api/characters/custom/{}", id), None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_persists_both_sides() {
    let app = app();
    let (_, user_id) = app.signup("chatter@example.com").await;
    let character_id = app.first_character_id().await;

    let missing = app
        .post(
            "/api/chat/send",
            None,
            json!({ "character_id": "does-not-exist", "user_id": user_id, "message": "hi" }),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let first = app
        .post(
            "/api/chat/send",
            None,
            json!({ "character_id": character_id, "user_id": user_id, "message": "hello" }),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["response"], "echo(0): hello");

    let second = app
        .post(
            "/api/chat/send",
            None,
            json!({ "character_id": character_id, "user_id": user_id, "message": "again" }),
        )
        .await;
    assert_eq!(second.body["response"], "echo(2): again");

    let history = app
        .get(&format!("/api/chat/history/{}?user_id={}", character_id, user_id), None)
        .await;
    let messages = history.body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[3]["sender"], "ai");
    assert_eq!(messages[3]["id"], second.body["message_id"]);

    let chats = app.get(&format!("/api/chat/my-chats?user_id={}", user_id), None).await;
    let chats = chats.body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["message_count"], 4);
}

#[tokio::test]
async fn favorites_are_idempotent() {
    let app = app();
    let (_, user_id) = app.signup("fan@example.com").await;
    let character_id = app.first_character_id().await;
    let body = json!({ "user_id": user_id, "character_id": character_id });

    let added = app.post("/api/favorites/add", None, body.clone()).await;
    assert_eq!(added.body["favorited"], true);
    let again = app.post("/api/favorites/add", None, body.clone()).await;
    assert_eq!(again.body["message"], "Already in favorites");

    let check = app
        .get(&format!("/api/favorites/check/{}/{}", user_id, character_id), None)
        .await;
    assert_eq!(check.body["favorited"], true);
    let list = app.get(&format!("/api/favorites/{}", user_id), None).await;
    assert_eq!(list.body["favorites"].as_array().unwrap().len(), 1);

    let removed = app.post("/api/favorites/remove", None, body.clone()).await;
    assert_eq!(removed.body["favorited"], false);
    let removed_again = app.post("/api/favorites/remove", None, body).await;
    assert_eq!(removed_again.status, StatusCode::OK);

    let check = app
        .get(&format!("/api/favorites/check/{}/{}", user_id, character_id), None)
        .await;
    assert_eq!(check.body["favorited"], false);
}

#[tokio::test]
async fn media_endpoints_forward_to_the_provider() {
    let app = app();
    let (_, user_id) = app.signup("artist@example.com").await;

    let voice = app.post("/api/voice/generate", None, json!({ "text": "hello" })).await;
    assert_eq!(voice.body["format"], "mp3");
    assert_eq!(voice.body["audio"], "SUQz");

    let blank = app
        .post("/api/images/generate", None, json!({ "user_id": user_id, "prompt": "   " }))
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let made = app
        .post("/api/images/generate", None, json!({ "user_id": user_id, "prompt": "a lighthouse" }))
        .await;
    assert_eq!(made.body["image"]["style"], "realistic");
    let image_id = made.body["image"]["id"].as_str().unwrap().to_string();

    let mine = app.get(&format!("/api/images/my/{}", user_id), None).await;
    assert_eq!(mine.body["images"].as_array().unwrap().len(), 1);

    let wrong_owner = app
        .call(Method::DELETE, &format!("/api/images/{}?user_id=other", image_id), None, None)
        .await;
    assert_eq!(wrong_owner.status, StatusCode::NOT_FOUND);

    let unknown = app
        .post("/api/image/generate", None, json!({ "prompt": "x", "character_id": "ghost" }))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}
