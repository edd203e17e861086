/// Rows that carry secrets and therefore never cross the API boundary as-is.
use companion_types::models::{Admin, User};

pub struct UserRow {
    pub user: User,
    pub password_hash: Option<String>,
}

pub struct AdminRow {
    pub admin: Admin,
    pub password_hash: String,
}

pub struct SessionRow {
    pub session_token: String,
    pub user_id: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
