use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use companion_types::api::{Claims, TokenKind};
use companion_types::models::AdminRole;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";

/// Authenticated end user, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Authenticated admin with the role currently stored for them.
#[derive(Debug, Clone)]
pub struct AuthAdmin {
    pub id: String,
    pub email: String,
    pub role: AdminRole,
}

pub fn decode_claims(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .ok()
        .map(|data| data.claims)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the caller from a user bearer token or, failing that, the
/// `session_token` cookie. `Ok(None)` means anonymous.
pub async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
    if let Some(token) = bearer(headers) {
        return Ok(decode_claims(&state.config.jwt_secret, token)
            .filter(|c| c.kind == TokenKind::User)
            .map(|c| AuthUser { id: c.sub, email: c.email }));
    }

    let jar = CookieJar::from_headers(headers);
    let Some(session_token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return Ok(None);
    };

    state
        .db(move |db| {
            let Some(session) = db.get_session(&session_token)? else {
                return Ok(None);
            };
            Ok(db
                .get_user_by_id(&session.user_id)?
                .map(|u| AuthUser { id: u.id, email: u.email }))
        })
        .await
}

/// Reject requests without a valid user token or session cookie.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, req.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Reject requests without a valid admin token for an admin that still exists.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = bearer(req.headers())
        .and_then(|token| decode_claims(&state.config.jwt_secret, token))
        .filter(|c| c.kind == TokenKind::Admin)
        .ok_or_else(|| ApiError::unauthorized("Invalid admin token"))?;

    let admin_id = claims.sub.clone();
    let row = state
        .db(move |db| db.get_admin_by_id(&admin_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Admin no longer exists"))?;

    req.extensions_mut().insert(AuthAdmin {
        id: row.admin.id,
        email: row.admin.email,
        role: row.admin.role,
    });
    Ok(next.run(req).await)
}
