use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use companion_types::api::{
    AuthResponse, Claims, GoogleSessionRequest, LoginRequest, MessageResponse, SignupRequest, TokenKind,
};
use companion_types::models::{AdminRole, User};

use crate::error::ApiError;
use crate::middleware::{AuthUser, SESSION_COOKIE};
use crate::state::AppState;

/// Lifetime of bearer tokens and OAuth session cookies.
pub const TOKEN_TTL_DAYS: i64 = 7;
const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        error!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

pub fn issue_token(
    secret: &str,
    sub: &str,
    email: &str,
    kind: TokenKind,
    role: Option<AdminRole>,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: sub.to_string(),
        email: email.to_string(),
        kind,
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        error!("JWT encode failed: {}", e);
        ApiError::Internal
    })
}

fn user_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    issue_token(&state.config.jwt_secret, &user.id, &user.email, TokenKind::User, None)
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email"));
    }
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let password = req.password;
    let created = state
        .db(move |db| {
            if db.get_user_by_email(&email)?.is_some() {
                return Ok(None);
            }
            let hash = hash_password(&password)?;
            db.create_user(&email, &username, Some(&hash), None, "email").map(Some)
        })
        .await?;
    let user = created.ok_or_else(|| ApiError::bad_request("Email already registered"))?;

    info!("User signed up: {}", user.email);
    let token = user_token(&state, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let user = state
        .db(move |db| {
            let Some(row) = db.get_user_by_email(&email)? else {
                return Ok(None);
            };
            // OAuth-only accounts have no password to check against.
            let ok = row.password_hash.as_deref().is_some_and(|hash| verify_password(&password, hash));
            if !ok {
                return Ok(None);
            }
            db.touch_user(&row.user.id)?;
            Ok(Some(row.user))
        })
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let token = user_token(&state, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .db(move |db| db.get_user_by_id(&auth.id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    Ok(Json(user))
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(time::Duration::days(TOKEN_TTL_DAYS))
        .build()
}

pub async fn google_session(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<GoogleSessionRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let identity = state
        .identity
        .exchange(&req.session_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid session"))?;

    let session_token = identity.session_token.clone();
    let user = state
        .db(move |db| {
            let user = db.upsert_oauth_user(&identity.email, &identity.name, identity.picture.as_deref())?;
            db.create_session(&identity.session_token, &user.id, chrono::Duration::days(TOKEN_TTL_DAYS))?;
            Ok(user)
        })
        .await?;

    info!("OAuth login: {}", user.email);
    let token = user_token(&state, &user)?;
    Ok((jar.add(session_cookie(session_token)), Json(AuthResponse { token, user })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        state.db(move |db| db.delete_session(&token)).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(MessageResponse::new("Logged out successfully"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_claims;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn tokens_carry_their_kind() {
        let token = issue_token("secret", "a1", "a@x.com", TokenKind::Admin, Some(AdminRole::Moderator)).unwrap();
        let claims = decode_claims("secret", &token).unwrap();
        assert_eq!(claims.kind, TokenKind::Admin);
        assert_eq!(claims.role, Some(AdminRole::Moderator));
        assert!(decode_claims("other-secret", &token).is_none());
    }
}
