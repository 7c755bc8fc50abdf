//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Storage Errors**: Any sqlx::Error. Fatal to the request, not the process.
/// - **Authentication Errors**: Missing, unknown or inactive bearer tokens
/// - **Lifecycle Errors**: Transitions whose preconditions do not hold. Rejected before any write.
/// - **Delivery Errors**: No recipient, or every recipient failed
/// - **Validation Errors**: Invalid request data
///
/// Lock verification denials are not errors; they are a normal
/// `VerifyKeyResponse` with `is_valid = false`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer token is missing, unknown, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing bearer token")]
    InvalidToken,

    /// Authenticated user may not act on this resource.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Not enough permissions")]
    Forbidden,

    /// Returns HTTP 404 Not Found.
    #[error("Digital key not found")]
    KeyNotFound,

    /// Returns HTTP 404 Not Found.
    #[error("Reservation not found")]
    ReservationNotFound,

    /// Keys can only be issued for confirmed or checked-in reservations.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Cannot issue a key for this reservation: {0}")]
    InvalidReservationState(String),

    /// A live key of this pass type already exists for the reservation.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A key of this pass type is already issued for the reservation")]
    KeyAlreadyIssued,

    /// Activation attempted outside the validity window.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Key is not within its validity window")]
    NotCurrentlyValid,

    /// Key is revoked; the transition is not permitted.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Key has been revoked")]
    KeyRevoked,

    /// New end date does not move the window forward or lies in the past.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("New end date must be after the current end date and in the future")]
    InvalidExtension,

    /// No stored contact and no override for the requested channel.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("No recipient available for delivery")]
    NoRecipient,

    /// Every delivery attempt failed.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl AppError {
    /// Stable machine-readable code placed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::InvalidToken => "invalid_token",
            AppError::Forbidden => "forbidden",
            AppError::KeyNotFound => "key_not_found",
            AppError::ReservationNotFound => "reservation_not_found",
            AppError::InvalidReservationState(_) => "invalid_reservation_state",
            AppError::KeyAlreadyIssued => "key_already_issued",
            AppError::NotCurrentlyValid => "not_currently_valid",
            AppError::KeyRevoked => "key_revoked",
            AppError::InvalidExtension => "invalid_extension",
            AppError::NoRecipient => "no_recipient",
            AppError::DeliveryFailure(_) => "delivery_failure",
            AppError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::KeyNotFound | AppError::ReservationNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidReservationState(_)
            | AppError::KeyAlreadyIssued
            | AppError::NotCurrentlyValid
            | AppError::KeyRevoked => StatusCode::CONFLICT,
            AppError::InvalidExtension | AppError::NoRecipient => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DeliveryFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database errors hide their details from the client and are logged instead.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "storage failure");
                "An internal error occurred".to_string()
            }
            AppError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (self.status(), body).into_response()
    }
}
