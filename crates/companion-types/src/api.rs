use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Admin, AdminRole, Character, User};

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Admin,
}

/// JWT claims shared by the user and admin token schemes. Both are signed
/// with the same secret; `kind` is what separates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AdminRole>,
    pub exp: usize,
}

/// Generic `{ "message": ... }` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct GoogleSessionRequest {
    pub session_id: String,
}

// -- Characters --

#[derive(Debug, Deserialize)]
pub struct CreateCharacterRequest {
    pub user_id: String,
    pub name: String,
    pub age: u32,
    pub personality: String,
    pub description: String,
    pub occupation: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    pub avatar_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CharacterEnvelope {
    pub character: Character,
}

#[derive(Debug, Serialize)]
pub struct CharacterList {
    pub characters: Vec<Character>,
}

// -- Chat --

#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    pub character_id: String,
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSendResponse {
    pub response: String,
    pub message_id: String,
}

/// One row of a user's conversation list.
#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub character: Character,
    pub last_message: String,
    pub last_timestamp: DateTime<Utc>,
    pub message_count: i64,
}

// -- Media --

fn default_voice() -> String {
    "nova".to_string()
}

fn default_style() -> String {
    "realistic".to_string()
}

#[derive(Debug, Deserialize)]
pub struct VoiceGenerateRequest {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub audio: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    pub character_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image: String,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
pub struct StandaloneImageRequest {
    pub user_id: String,
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style: String,
}

// -- Favorites --

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub user_id: String,
    pub character_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteStatus {
    pub favorited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- Push --

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct PushSubscribeRequest {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceUpdateRequest {
    pub enabled: bool,
    pub frequency: String,
    /// Wide integers so out-of-range hours reach validation instead of the decoder.
    pub quiet_hours_start: i64,
    pub quiet_hours_end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
    pub character_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
}

/// Body delivered to the browser service worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub character_id: String,
    pub data: NotificationData,
}

#[derive(Debug, Serialize)]
pub struct GenerateNotificationResponse {
    pub send: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationPayload>,
}

#[derive(Debug, Serialize)]
pub struct InactiveUser {
    pub user_id: String,
    pub username: String,
    pub last_active: Option<DateTime<Utc>>,
}

// -- Payments --

fn default_payment_method() -> String {
    "stripe".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
    pub origin_url: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub session_id: String,
    pub status: String,
    pub payment_status: String,
    pub amount: f64,
    pub currency: String,
    pub plan_id: String,
}

// -- Admin --

#[derive(Debug, Serialize)]
pub struct AdminAuthResponse {
    pub token: String,
    pub admin: Admin,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCredentialsRequest {
    pub current_password: String,
    pub new_email: Option<String>,
    pub new_password: Option<String>,
}

fn default_admin_role() -> AdminRole {
    AdminRole::Admin
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_admin_role")]
    pub role: AdminRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct CharacterUpdateRequest {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub personality: Option<String>,
    pub traits: Option<Vec<String>>,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub occupation: Option<String>,
}

fn default_kind() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AdminNotificationRequest {
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_post_category() -> String {
    "General".to_string()
}

fn default_post_status() -> String {
    "draft".to_string()
}

#[derive(Debug, Deserialize)]
pub struct BlogPostRequest {
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub meta_keywords: Vec<String>,
    #[serde(default = "default_post_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    #[serde(default = "default_post_status")]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlogPostUpdateRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<Vec<String>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
}

// -- Aggregates --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterChatCount {
    pub character_id: String,
    pub name: String,
    pub chat_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserMessageCount {
    pub user_id: String,
    pub username: String,
    pub message_count: i64,
}

/// One conversation as seen by moderators.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOverview {
    pub chat_id: String,
    pub user_id: String,
    pub user_name: String,
    pub character_id: String,
    pub character_name: String,
    pub message_count: i64,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsOverview {
    pub total_users: i64,
    pub total_characters: i64,
    pub total_messages: i64,
    pub total_images: i64,
    pub total_favorites: i64,
    pub total_custom_characters: i64,
    pub recent_users: Vec<User>,
    pub users_by_day: Vec<DayCount>,
}

#[derive(Debug, Serialize)]
pub struct ChatAnalytics {
    pub most_popular_characters: Vec<CharacterChatCount>,
    pub most_active_users: Vec<UserMessageCount>,
    pub total_messages: i64,
    pub average_messages_per_user: f64,
    pub messages_by_day: Vec<DayCount>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionBreakdown {
    pub free: i64,
    pub premium: i64,
    pub ultimate: i64,
}

#[derive(Debug, Serialize)]
pub struct MonthRevenue {
    pub month: String,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
pub struct RevenueAnalytics {
    pub monthly_revenue: f64,
    pub annual_projected: f64,
    pub subscription_breakdown: SubscriptionBreakdown,
    pub revenue_trend: Vec<MonthRevenue>,
    pub is_mocked: bool,
}

#[derive(Debug, Serialize)]
pub struct BlogPostPage {
    pub posts: Vec<crate::models::BlogPost>,
    pub total: i64,
    pub page: u32,
    pub pages: u32,
}
