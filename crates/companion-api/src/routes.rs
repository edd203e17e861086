use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};

use crate::middleware::{require_admin, require_user};
use crate::state::AppState;
use crate::{admin, announcements, auth, blog, characters, chat, favorites, media, payments, push};

/// The full application: JSON API under `/api` plus `/sitemap.xml` at the root.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/google/session", post(auth::google_session))
        .route("/auth/logout", post(auth::logout))
        .route("/characters", get(characters::list))
        .route("/characters/create", post(characters::create))
        .route("/characters/my/{user_id}", get(characters::list_mine))
        .route("/characters/custom/{id}", get(characters::get_custom).delete(characters::delete_custom))
        .route("/characters/{id}", get(characters::get))
        .route("/chat/send", post(chat::send))
        .route("/chat/history/{character_id}", get(chat::history))
        .route("/chat/my-chats", get(chat::my_chats))
        .route("/voice/generate", post(media::voice))
        .route("/image/generate", post(media::character_image))
        .route("/images/generate", post(media::generate))
        .route("/images/my/{user_id}", get(media::list_mine))
        .route("/images/{id}", delete(media::delete))
        .route("/favorites/add", post(favorites::add))
        .route("/favorites/remove", post(favorites::remove))
        .route("/favorites/check/{user_id}/{character_id}", get(favorites::check))
        .route("/favorites/{user_id}", get(favorites::list))
        .route("/push/vapid-public-key", get(push::vapid_public_key))
        .route("/push/preferences/{user_id}", get(push::get_preferences).put(push::set_preferences))
        .route("/push/generate-notification/{user_id}", get(push::generate_notification))
        .route("/push/notification-history/{user_id}", get(push::notification_history))
        .route("/push/check-inactivity", get(push::check_inactivity))
        .route("/push/update-activity", post(push::update_activity))
        .route("/payments/plans", get(payments::list_plans))
        .route("/payments/status/{session_id}", get(payments::status))
        .route("/webhook/stripe", post(payments::stripe_webhook))
        .route("/announcements/active", get(announcements::active))
        .route("/notifications/{user_id}", get(announcements::inbox))
        .route("/blog/posts", get(blog::list_published))
        .route("/blog/posts/{slug}", get(blog::get_published))
        .route("/blog/categories", get(blog::categories))
        .route("/blog/tags", get(blog::tags))
        .route("/blog/related/{slug}", get(blog::related))
        .route("/admin/login", post(admin::login));

    let user_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/push/subscribe", post(push::subscribe))
        .route("/push/unsubscribe", post(push::unsubscribe))
        .route("/push/test", post(push::send_test))
        .route("/payments/checkout", post(payments::checkout))
        .route("/payments/user-subscription", get(payments::user_subscription))
        .route("/payments/history", get(payments::history))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin_routes = Router::new()
        .route("/admin/verify", get(admin::verify))
        .route("/admin/update-credentials", put(admin::update_credentials))
        .route("/admin/analytics", get(admin::analytics))
        .route("/admin/analytics/chats", get(admin::chat_analytics))
        .route("/admin/analytics/revenue", get(admin::revenue_analytics))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route("/admin/characters", get(admin::list_characters))
        .route("/admin/characters/{id}", put(admin::update_character).delete(admin::delete_character))
        .route("/admin/chats", get(admin::list_chats))
        .route("/admin/chats/{chat_id}", delete(admin::delete_chat))
        .route("/admin/chats/{chat_id}/messages", get(admin::chat_messages))
        .route("/admin/announcements", get(admin::list_announcements).post(admin::create_announcement))
        .route(
            "/admin/announcements/{id}",
            put(admin::update_announcement).delete(admin::delete_announcement),
        )
        .route("/admin/notifications", get(admin::list_notifications).post(admin::create_notification))
        .route("/admin/admins", get(admin::list_admins).post(admin::create_admin))
        .route("/admin/admins/{id}", delete(admin::delete_admin))
        .route("/admin/activity-logs", get(admin::activity_logs))
        .route("/admin/activity-logs/summary", get(admin::activity_summary))
        .route("/admin/blog/posts", get(blog::admin_list).post(blog::create))
        .route("/admin/blog/posts/{id}", get(blog::admin_get).put(blog::update).delete(blog::delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new().merge(public_routes).merge(user_routes).merge(admin_routes);

    Router::new()
        .nest("/api", api)
        .route("/sitemap.xml", get(blog::sitemap))
        .with_state(state)
}
