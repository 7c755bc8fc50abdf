//! Lock verification endpoint.

use crate::{
    error::AppError,
    models::access_event::{VerifyKeyRequest, VerifyKeyResponse},
    services::verification,
    state::AppState,
};
use axum::{Json, extract::State};
use chrono::Utc;

/// Verify a key presented at a lock.
///
/// # Endpoint
///
/// `POST /api/v1/verify/key`
///
/// # Authentication
///
/// None. Called by lock hardware, which holds no session.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "is_valid": true,
///   "message": "Access granted",
///   "room_number": "412",
///   "guest_name": "Ada Lovelace"
/// }
/// ```
///
/// A denial is also 200, with `is_valid: false` and the message
/// `"Access denied"` regardless of the cause.
pub async fn verify_key(
    State(state): State<AppState>,
    Json(request): Json<VerifyKeyRequest>,
) -> Result<Json<VerifyKeyResponse>, AppError> {
    if request.lock_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("lock_id is required".to_string()));
    }

    let response = verification::verify_key(&state.store, request, Utc::now()).await?;
    Ok(Json(response))
}
