//! Digital key HTTP handlers.
//!
//! This module implements the key-related API endpoints:
//! - POST /api/v1/keys - Issue a key for a reservation
//! - GET /api/v1/keys - List keys
//! - GET /api/v1/keys/{id} - Get key by ID
//! - PATCH /api/v1/keys/{id}/activate|deactivate|revoke|extend - Lifecycle transitions
//! - POST /api/v1/keys/{id}/regenerate - Revoke and reissue
//! - POST /api/v1/keys/{id}/send-email|send-sms - Deliver the pass
//! - GET /api/v1/keys/{id}/events|access-events - Audit history

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        access_event::AccessEvent,
        delivery::{DeliveryReport, SendEmailRequest, SendSmsRequest},
        digital_key::{CreateKeyRequest, DigitalKeyResponse, ExtendKeyRequest, ListKeysQuery},
        key_event::{EventPage, KeyEvent},
    },
    services::{delivery, lifecycle},
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

/// Issue a new key.
///
/// # Endpoint
///
/// `POST /api/v1/keys` (staff)
///
/// # Request Body
///
/// ```json
/// {
///   "reservation_id": "550e8400-e29b-41d4-a716-446655440000",
///   "pass_type": "apple",
///   "send_email": true,
///   "send_sms": true,
///   "phone_numbers": ["+15551234567"]
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: The new key, status `created`
/// - **Error (404)**: Reservation not found
/// - **Error (409)**: Reservation cannot receive keys, or a live key of this pass type exists
///
/// Requested deliveries run in the background after the key is stored.
/// Their outcome is visible in the key's events, never in this response.
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<DigitalKeyResponse>), AppError> {
    let now = Utc::now();
    let key = lifecycle::create_key(
        &state.store,
        &state.passes,
        &auth,
        request.reservation_id,
        request.pass_type,
        now,
    )
    .await?;

    if request.send_email || request.send_sms {
        let state = state.clone();
        let key_id = key.id;
        tokio::spawn(async move {
            let hotel = state.config.hotel_name.as_str();
            if request.send_email {
                if let Err(e) = delivery::deliver_email(
                    &state.store,
                    &state.transport,
                    Some(auth.user_id),
                    key_id,
                    request.alternative_email,
                    hotel,
                    Utc::now(),
                )
                .await
                {
                    tracing::error!(
                        key_id = %key_id,
                        error = %e,
                        "email delivery after issue failed"
                    );
                }
            }
            if request.send_sms {
                if let Err(e) = delivery::deliver_sms(
                    &state.store,
                    &state.transport,
                    Some(auth.user_id),
                    key_id,
                    request.phone_numbers,
                    hotel,
                    Utc::now(),
                )
                .await
                {
                    tracing::error!(
                        key_id = %key_id,
                        error = %e,
                        "sms delivery after issue failed"
                    );
                }
            }
        });
    }

    Ok((StatusCode::CREATED, Json(DigitalKeyResponse::at(key, now))))
}

/// List keys, newest first.
///
/// `GET /api/v1/keys?reservation_id=&skip=0&limit=100` (staff)
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<DigitalKeyResponse>>, AppError> {
    let now = Utc::now();
    let keys = lifecycle::list_keys(&state.store, &auth, &query).await?;

    Ok(Json(
        keys.into_iter()
            .map(|k| DigitalKeyResponse::at(k, now))
            .collect(),
    ))
}

/// Get a key by ID.
///
/// Guests may fetch keys of their own reservations.
pub async fn get_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<DigitalKeyResponse>, AppError> {
    let key = lifecycle::get_key(&state.store, &auth, key_id).await?;
    Ok(Json(DigitalKeyResponse::at(key, Utc::now())))
}

/// Activate a key.
///
/// # Response
///
/// - **Success (200 OK)**: Updated key (unchanged if it was already active)
/// - **Error (409)**: `key_revoked` or `not_currently_valid`
pub async fn activate_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<DigitalKeyResponse>, AppError> {
    let now = Utc::now();
    let key = lifecycle::activate_key(&state.store, &auth, key_id, now).await?;
    Ok(Json(DigitalKeyResponse::at(key, now)))
}

pub async fn deactivate_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<DigitalKeyResponse>, AppError> {
    let now = Utc::now();
    let key = lifecycle::deactivate_key(&state.store, &auth, key_id, now).await?;
    Ok(Json(DigitalKeyResponse::at(key, now)))
}

/// Extend a key's validity window.
///
/// # Request Body
///
/// ```json
/// { "new_end_date": "2024-01-05T11:00:00Z" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: Updated key with a re-signed `pass_url`
/// - **Error (409)**: Key revoked
/// - **Error (422)**: New end date is not later than the current one, or is in the past
pub async fn extend_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
    Json(request): Json<ExtendKeyRequest>,
) -> Result<Json<DigitalKeyResponse>, AppError> {
    let now = Utc::now();
    let key = lifecycle::extend_key(
        &state.store,
        &state.passes,
        &auth,
        key_id,
        request.new_end_date,
        now,
    )
    .await?;
    Ok(Json(DigitalKeyResponse::at(key, now)))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<DigitalKeyResponse>, AppError> {
    let now = Utc::now();
    let key = lifecycle::revoke_key(&state.store, &auth, key_id, now).await?;
    Ok(Json(DigitalKeyResponse::at(key, now)))
}

/// Revoke a key and issue its replacement. Returns the new key (201).
pub async fn regenerate_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<(StatusCode, Json<DigitalKeyResponse>), AppError> {
    let now = Utc::now();
    let key = lifecycle::regenerate_key(&state.store, &state.passes, &auth, key_id, now).await?;
    Ok((StatusCode::CREATED, Json(DigitalKeyResponse::at(key, now))))
}

/// Email the pass.
///
/// The body is optional; `{"alternative_email": "..."}` overrides the
/// guest's stored address.
///
/// # Response
///
/// - **Success (200 OK)**: Delivery report
/// - **Error (422)**: No recipient
/// - **Error (502)**: The message could not be sent
pub async fn send_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
    request: Option<Json<SendEmailRequest>>,
) -> Result<Json<DeliveryReport>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let report = delivery::send_email(
        &state.store,
        &state.transport,
        &auth,
        key_id,
        request.alternative_email,
        &state.config.hotel_name,
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}

/// Text the pass.
///
/// Accepts `{"phone_numbers": [...]}` or a bare array. An empty list sends
/// to the guest's stored phone.
pub async fn send_sms(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
    Json(request): Json<SendSmsRequest>,
) -> Result<Json<DeliveryReport>, AppError> {
    let report = delivery::send_sms(
        &state.store,
        &state.transport,
        &auth,
        key_id,
        request.into_numbers(),
        &state.config.hotel_name,
        Utc::now(),
    )
    .await?;
    Ok(Json(report))
}

pub async fn key_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
    Query(page): Query<EventPage>,
) -> Result<Json<Vec<KeyEvent>>, AppError> {
    let events = lifecycle::key_events(&state.store, &auth, key_id, page).await?;
    Ok(Json(events))
}

pub async fn access_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
    Query(page): Query<EventPage>,
) -> Result<Json<Vec<AccessEvent>>, AppError> {
    let events = lifecycle::access_events(&state.store, &auth, key_id, page).await?;
    Ok(Json(events))
}
