use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user as exposed over the API. The password hash never leaves
/// the database crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub picture: Option<String>,
    pub auth_provider: String,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterCategory {
    Girls,
    Anime,
    Guys,
    Custom,
}

impl CharacterCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Girls => "Girls",
            Self::Anime => "Anime",
            Self::Guys => "Guys",
            Self::Custom => "Custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Girls" => Some(Self::Girls),
            "Anime" => Some(Self::Anime),
            "Guys" => Some(Self::Guys),
            "Custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub personality: String,
    pub traits: Vec<String>,
    pub category: CharacterCategory,
    pub avatar_url: String,
    pub description: String,
    pub occupation: Option<String>,
    pub is_custom: bool,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

/// Conversation key shared by every message between one user and one character.
pub fn chat_id(user_id: &str, character_id: &str) -> String {
    format!("{}_{}", user_id, character_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    pub character_id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub style: String,
    pub image_data: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

// -- Push notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Low,
    Medium,
    High,
}

impl Frequency {
    /// Maximum notifications per user per UTC day.
    pub fn daily_cap(&self) -> u32 {
        match self {
            Self::Low => 2,
            Self::Medium => 5,
            Self::High => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub enabled: bool,
    pub frequency: Frequency,
    pub quiet_hours_start: u8,
    pub quiet_hours_end: u8,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: Frequency::Medium,
            quiet_hours_start: 22,
            quiet_hours_end: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Random,
    Inactivity,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Inactivity => "inactivity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "random" => Some(Self::Random),
            "inactivity" => Some(Self::Inactivity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentNotification {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub sent_date: String,
    pub sent_at: DateTime<Utc>,
}

// -- Admin / CMS --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    Admin,
    Moderator,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "super_admin" => Some(Self::SuperAdmin),
            "admin" => Some(Self::Admin),
            "moderator" => Some(Self::Moderator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: AdminRole,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub admin_id: String,
    pub admin_email: String,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-app notification written by an admin. `user_id == None` is a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotification {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub meta_description: String,
    pub meta_keywords: Vec<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub author: String,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Payments --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Self::Stripe),
            "paypal" => Some(Self::Paypal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub user_email: String,
    pub plan_id: String,
    pub amount: f64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: String,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscription {
    pub user_id: String,
    pub plan_id: String,
    pub status: String,
    pub payment_method: PaymentMethod,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_caps() {
        assert_eq!(Frequency::Low.daily_cap(), 2);
        assert_eq!(Frequency::Medium.daily_cap(), 5);
        assert_eq!(Frequency::High.daily_cap(), 8);
        assert_eq!(Frequency::parse("extreme"), None);
    }

    #[test]
    fn chat_id_joins_user_and_character() {
        assert_eq!(chat_id("u1", "c9"), "u1_c9");
    }

    #[test]
    fn announcement_kind_serializes_as_type() {
        let a = Announcement {
            id: "a".into(),
            title: "t".into(),
            message: "m".into(),
            kind: "info".into(),
            is_active: true,
            created_by: "admin@admin.com".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "info");
        assert!(v.get("kind").is_none());
    }
}
