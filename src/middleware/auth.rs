//! Bearer token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and verify it exists in the database
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! `/api/v1/verify/key` is deliberately outside this layer: locks cannot
//! hold a staff or guest session.

use crate::{
    error::AppError,
    models::api_token::{ApiToken, Role},
    state::AppState,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map and passed explicitly into
/// every service call that needs to know who is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    /// User the token was issued to
    pub user_id: Uuid,

    pub role: Role,
}

impl AuthContext {
    pub fn staff(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Staff,
        }
    }

    pub fn guest(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Guest,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Fail with `Forbidden` unless the caller is staff.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// SHA-256 hex digest of a bearer token, as stored in `api_tokens.token_hash`.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bearer token authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Query database for matching hash where `is_active = true`
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidToken)?;

    let token_hash = hash_token(token);

    let record = sqlx::query_as::<_, ApiToken>(
        "SELECT id, token_hash, user_id, role, created_at, is_active
         FROM api_tokens
         WHERE token_hash = $1 AND is_active = true",
    )
    .bind(&token_hash)
    .fetch_optional(&state.store.pool)
    .await?
    .ok_or(AppError::InvalidToken)?;

    tracing::debug!(token_id = %record.id, user_id = %record.user_id, "request authenticated");

    // Route handlers extract this using Extension<AuthContext>
    request.extensions_mut().insert(AuthContext {
        user_id: record.user_id,
        role: record.role,
    });

    Ok(next.run(request).await)
}
