//! Admin panel: analytics, moderation and admin management.
//!
//! Every route except `login` sits behind `require_admin`. Mutations append an
//! activity log entry attributed to the calling admin.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{Datelike, Months, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use companion_db::queries::NewActivity;
use companion_types::api::{
    AdminAuthResponse, AdminNotificationRequest, AnalyticsOverview, AnnouncementRequest, ChatAnalytics,
    CharacterUpdateRequest, CreateAdminRequest, LoginRequest, MessageResponse, MonthRevenue, RevenueAnalytics,
    TokenKind, UpdateCredentialsRequest,
};
use companion_types::models::{Admin, AdminRole, CharacterCategory};
use companion_types::plans::find_plan;

use crate::auth::{hash_password, issue_token, verify_password};
use crate::error::ApiError;
use crate::middleware::AuthAdmin;
use crate::state::AppState;

const RECENT_USERS: u32 = 10;
const TOP_N: u32 = 10;
const TREND_DAYS: i64 = 7;
const TREND_MONTHS: u32 = 6;
const MIN_PASSWORD_LEN: usize = 6;

/// Audit-trail entry owned so it can cross into the blocking pool.
pub(crate) struct Activity {
    pub action: &'static str,
    pub target_type: Option<&'static str>,
    pub target_id: Option<String>,
    pub details: Option<String>,
}

impl Activity {
    pub fn new(action: &'static str) -> Self {
        Self { action, target_type: None, target_id: None, details: None }
    }

    pub fn target(mut self, kind: &'static str, id: impl Into<String>) -> Self {
        self.target_type = Some(kind);
        self.target_id = Some(id.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub(crate) async fn log_activity(state: &AppState, admin: &AuthAdmin, activity: Activity) -> Result<(), ApiError> {
    let admin_id = admin.id.clone();
    let admin_email = admin.email.clone();
    state
        .db(move |db| {
            db.log_activity(NewActivity {
                admin_id: &admin_id,
                admin_email: &admin_email,
                action: activity.action,
                target_type: activity.target_type,
                target_id: activity.target_id.as_deref(),
                details: activity.details,
            })
        })
        .await
}

fn require_super_admin(admin: &AuthAdmin) -> Result<(), ApiError> {
    if admin.role != AdminRole::SuperAdmin {
        return Err(ApiError::forbidden("Only super admins can manage admins"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub is_custom: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_log_limit")]
    pub limit: u32,
    pub action: Option<String>,
}

fn default_log_limit() -> u32 {
    100
}

// -- Session --

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AdminAuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let admin = state
        .db(move |db| {
            let Some(row) = db.get_admin_by_email(&email)? else {
                return Ok(None);
            };
            if !verify_password(&password, &row.password_hash) {
                return Ok(None);
            }
            db.record_admin_login(&row.admin.id)?;
            Ok(db.get_admin_by_id(&row.admin.id)?.map(|r| r.admin))
        })
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid admin credentials"))?;

    let token = issue_token(&state.config.jwt_secret, &admin.id, &admin.email, TokenKind::Admin, Some(admin.role))?;
    let caller = AuthAdmin { id: admin.id.clone(), email: admin.email.clone(), role: admin.role };
    log_activity(&state, &caller, Activity::new("login")).await?;

    info!("Admin logged in: {}", admin.email);
    Ok(Json(AdminAuthResponse { token, admin }))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
) -> Result<Json<Value>, ApiError> {
    let admin = state
        .db(move |db| db.get_admin_by_id(&caller.id))
        .await?
        .map(|row| row.admin)
        .ok_or_else(|| ApiError::unauthorized("Admin no longer exists"))?;
    Ok(Json(json!({ "admin": admin })))
}

pub async fn update_credentials(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Json(req): Json<UpdateCredentialsRequest>,
) -> Result<Json<Value>, ApiError> {
    let new_email = req.new_email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
    let new_password = req.new_password.filter(|p| !p.is_empty());
    if new_email.is_none() && new_password.is_none() {
        return Err(ApiError::bad_request("Nothing to update"));
    }
    if new_email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    if new_password.as_deref().is_some_and(|p| p.len() < MIN_PASSWORD_LEN) {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    enum Outcome {
        Updated(Admin),
        WrongPassword,
        EmailTaken,
    }

    let admin_id = caller.id.clone();
    let current_password = req.current_password;
    let changed_email = new_email.is_some();
    let outcome = state
        .db(move |db| {
            let Some(row) = db.get_admin_by_id(&admin_id)? else {
                return Ok(Outcome::WrongPassword);
            };
            if !verify_password(&current_password, &row.password_hash) {
                return Ok(Outcome::WrongPassword);
            }
            if let Some(email) = new_email.as_deref() {
                if db.get_admin_by_email(email)?.is_some_and(|other| other.admin.id != admin_id) {
                    return Ok(Outcome::EmailTaken);
                }
            }
            let hash = new_password.as_deref().map(hash_password).transpose()?;
            Ok(match db.update_admin_credentials(&admin_id, new_email.as_deref(), hash.as_deref())? {
                Some(admin) => Outcome::Updated(admin),
                None => Outcome::WrongPassword,
            })
        })
        .await?;

    let admin = match outcome {
        Outcome::Updated(admin) => admin,
        Outcome::WrongPassword => return Err(ApiError::unauthorized("Current password is incorrect")),
        Outcome::EmailTaken => return Err(ApiError::bad_request("Email already in use")),
    };

    let what = if changed_email { "email" } else { "password" };
    log_activity(&state, &caller, Activity::new("update_credentials").target("admin", &admin.id).details(what)).await?;
    Ok(Json(json!({ "message": "Credentials updated successfully", "admin": admin })))
}

// -- Analytics --

pub async fn analytics(State(state): State<AppState>) -> Result<Json<AnalyticsOverview>, ApiError> {
    let overview = state
        .db(|db| {
            Ok(AnalyticsOverview {
                total_users: db.count_users()?,
                total_characters: db.count_characters(false)?,
                total_messages: db.count_messages()?,
                total_images: db.count_images()?,
                total_favorites: db.count_favorites()?,
                total_custom_characters: db.count_characters(true)?,
                recent_users: db.list_users(0, RECENT_USERS)?,
                users_by_day: db.users_by_day(TREND_DAYS)?,
            })
        })
        .await?;
    Ok(Json(overview))
}

pub async fn chat_analytics(State(state): State<AppState>) -> Result<Json<ChatAnalytics>, ApiError> {
    let analytics = state
        .db(|db| {
            let total_messages = db.count_messages()?;
            let chatting_users = db.count_chatting_users()?;
            let average_messages_per_user = if chatting_users == 0 {
                0.0
            } else {
                ((total_messages as f64 / chatting_users as f64) * 100.0).round() / 100.0
            };
            Ok(ChatAnalytics {
                most_popular_characters: db.popular_characters(TOP_N)?,
                most_active_users: db.most_active_users(TOP_N)?,
                total_messages,
                average_messages_per_user,
                messages_by_day: db.messages_by_day(TREND_DAYS)?,
            })
        })
        .await?;
    Ok(Json(analytics))
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Revenue figures derived from live subscription counts at list price.
/// The monthly trend is synthetic.
pub async fn revenue_analytics(State(state): State<AppState>) -> Result<Json<RevenueAnalytics>, ApiError> {
    let breakdown = state.db(|db| db.subscription_breakdown()).await?;

    let premium = find_plan("premium_monthly").map(|p| p.amount).unwrap_or_default();
    let ultimate = find_plan("ultimate_monthly").map(|p| p.amount).unwrap_or_default();
    let monthly_revenue = round_cents(breakdown.premium as f64 * premium + breakdown.ultimate as f64 * ultimate);

    let now = Utc::now();
    let revenue_trend = (0..TREND_MONTHS)
        .rev()
        .map(|back| {
            let month = now.checked_sub_months(Months::new(back)).unwrap_or(now);
            let ramp = 1.0 - f64::from(back) * 0.12;
            MonthRevenue {
                month: format!("{}-{:02}", month.year(), month.month()),
                revenue: round_cents(monthly_revenue * ramp),
            }
        })
        .collect();

    Ok(Json(RevenueAnalytics {
        monthly_revenue,
        annual_projected: round_cents(monthly_revenue * 12.0),
        subscription_breakdown: breakdown,
        revenue_trend,
        is_mocked: true,
    }))
}

// -- Users --

pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let (skip, limit) = (q.skip, q.limit);
    let (users, total) = state
        .db(move |db| Ok((db.list_users(skip, limit)?, db.count_users()?)))
        .await?;
    Ok(Json(json!({ "users": users, "total": total, "skip": skip, "limit": limit })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = id.clone();
    if !state.db(move |db| db.delete_user(&target)).await? {
        return Err(ApiError::not_found("User not found"));
    }
    log_activity(&state, &caller, Activity::new("delete_user").target("user", id)).await?;
    Ok(Json(MessageResponse::new("User and related data deleted")))
}

// -- Characters --

pub async fn list_characters(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (defaults, custom) = state
        .db(|db| Ok((db.list_characters(None)?, db.list_characters(Some(CharacterCategory::Custom))?)))
        .await?;
    Ok(Json(json!({
        "total_default": defaults.len(),
        "total_custom": custom.len(),
        "default_characters": defaults,
        "custom_characters": custom,
    })))
}

pub async fn update_character(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
    Query(q): Query<CatalogQuery>,
    Json(update): Json<CharacterUpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = id.clone();
    let character = state
        .db(move |db| db.update_character(&target, q.is_custom, &update))
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;

    log_activity(&state, &caller, Activity::new("update_character").target("character", id).details(character.name.clone()))
        .await?;
    Ok(Json(json!({ "message": "Character updated", "character": character })))
}

pub async fn delete_character(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
    Query(q): Query<CatalogQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let is_custom = q.is_custom;
    let target = id.clone();
    let deleted = state
        .db(move |db| {
            if is_custom {
                db.delete_custom_character(&target, None)
            } else {
                db.delete_default_character(&target)
            }
        })
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Character not found"));
    }
    let kind = if is_custom { "custom_character" } else { "character" };
    log_activity(&state, &caller, Activity::new("delete_character").target(kind, id)).await?;
    Ok(Json(MessageResponse::new("Character deleted")))
}

// -- Chats --

pub async fn list_chats(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let (chats, total) = state
        .db(move |db| Ok((db.chat_overviews(q.skip, q.limit)?, db.count_chats()?)))
        .await?;
    Ok(Json(json!({ "chats": chats, "total": total })))
}

pub async fn chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.db(move |db| db.chat_history(&chat_id)).await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = chat_id.clone();
    let deleted = state.db(move |db| db.delete_chat(&target)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Chat not found"));
    }
    log_activity(
        &state,
        &caller,
        Activity::new("delete_chat").target("chat", chat_id).details(format!("{} messages", deleted)),
    )
    .await?;
    Ok(Json(json!({ "message": "Chat deleted", "deleted_count": deleted })))
}

// -- Announcements --

pub async fn list_announcements(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let announcements = state.db(|db| db.list_announcements(false)).await?;
    Ok(Json(json!({ "announcements": announcements })))
}

pub async fn create_announcement(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Json(req): Json<AnnouncementRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let created_by = caller.email.clone();
    let announcement = state
        .db(move |db| db.create_announcement(&req.title, &req.message, &req.kind, req.is_active, &created_by))
        .await?;
    log_activity(
        &state,
        &caller,
        Activity::new("create_announcement").target("announcement", &announcement.id).details(announcement.title.clone()),
    )
    .await?;
    Ok(Json(json!({ "announcement": announcement })))
}

pub async fn update_announcement(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
    Json(req): Json<AnnouncementRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = id.clone();
    let announcement = state
        .db(move |db| db.update_announcement(&target, &req.title, &req.message, &req.kind, req.is_active))
        .await?
        .ok_or_else(|| ApiError::not_found("Announcement not found"))?;
    log_activity(&state, &caller, Activity::new("update_announcement").target("announcement", id)).await?;
    Ok(Json(json!({ "announcement": announcement })))
}

pub async fn delete_announcement(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = id.clone();
    if !state.db(move |db| db.delete_announcement(&target)).await? {
        return Err(ApiError::not_found("Announcement not found"));
    }
    log_activity(&state, &caller, Activity::new("delete_announcement").target("announcement", id)).await?;
    Ok(Json(MessageResponse::new("Announcement deleted")))
}

// -- In-app notifications --

pub async fn list_notifications(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let notifications = state.db(|db| db.list_user_notifications(100)).await?;
    Ok(Json(json!({ "notifications": notifications })))
}

pub async fn create_notification(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Json(req): Json<AdminNotificationRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let created_by = caller.email.clone();
    let notification = state
        .db(move |db| {
            let user_id = req.user_id.as_deref().filter(|id| !id.is_empty());
            if let Some(id) = user_id {
                if db.get_user_by_id(id)?.is_none() {
                    return Ok(None);
                }
            }
            db.create_user_notification(user_id, &req.title, &req.message, &req.kind, &created_by)
                .map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let target = notification.user_id.clone().unwrap_or_else(|| "all".to_string());
    log_activity(&state, &caller, Activity::new("send_notification").target("user", target)).await?;
    Ok(Json(json!({ "notification": notification })))
}

// -- Admins --

pub async fn list_admins(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let admins = state.db(|db| db.list_admins()).await?;
    Ok(Json(json!({ "admins": admins })))
}

pub async fn create_admin(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Json(req): Json<CreateAdminRequest>,
) -> Result<Json<Value>, ApiError> {
    require_super_admin(&caller)?;
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || req.username.trim().is_empty() {
        return Err(ApiError::bad_request("Email and username are required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let admin = state
        .db(move |db| {
            if db.get_admin_by_email(&email)?.is_some() {
                return Ok(None);
            }
            let hash = hash_password(&req.password)?;
            db.create_admin(&email, req.username.trim(), &hash, req.role).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::bad_request("Admin with this email already exists"))?;

    log_activity(
        &state,
        &caller,
        Activity::new("create_admin").target("admin", &admin.id).details(admin.role.as_str()),
    )
    .await?;
    Ok(Json(json!({ "admin": admin })))
}

pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthAdmin>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_super_admin(&caller)?;
    if id == caller.id {
        return Err(ApiError::forbidden("You cannot delete your own account"));
    }
    let target = id.clone();
    if !state.db(move |db| db.delete_admin(&target)).await? {
        return Err(ApiError::not_found("Admin not found"));
    }
    log_activity(&state, &caller, Activity::new("delete_admin").target("admin", id)).await?;
    Ok(Json(MessageResponse::new("Admin deleted")))
}

// -- Activity logs --

pub async fn activity_logs(
    State(state): State<AppState>,
    Query(q): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    let logs = state
        .db(move |db| db.activity_logs(q.limit, q.action.as_deref().filter(|a| !a.is_empty())))
        .await?;
    Ok(Json(json!({ "logs": logs })))
}

pub async fn activity_summary(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summary = state.db(|db| db.activity_summary()).await?;
    Ok(Json(json!({
        "total_logs": summary.total_logs,
        "recent_activity_count": summary.recent_activity_count,
        "actions_by_type": summary.actions_by_type,
    })))
}
