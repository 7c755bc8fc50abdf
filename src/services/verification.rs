//! Lock verification.
//!
//! Answers a lock's "may this token open this door right now?" and records
//! the attempt. Reads key state, never changes lifecycle fields; the only
//! write to the key is the usage counter on a grant.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        access_event::{AccessOutcome, NewAccessEvent, VerifyKeyRequest, VerifyKeyResponse},
        digital_key::KeyStatus,
    },
    store::{KeyStore, LockTarget},
};

/// Why a verification was denied. Stored on the access event and logged,
/// never returned to the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    KeyNotFound,
    NotActive(KeyStatus),
    ReservationInactive,
    LockMismatch,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::KeyNotFound => f.write_str("key not found"),
            DenialReason::NotActive(status) => write!(f, "key is {status}"),
            DenialReason::ReservationInactive => f.write_str("reservation does not allow access"),
            DenialReason::LockMismatch => f.write_str("lock does not belong to the key's room"),
        }
    }
}

/// Decide whether `target` may open `lock_id` at `now`.
pub fn evaluate(
    target: Option<&LockTarget>,
    lock_id: &str,
    now: DateTime<Utc>,
) -> Result<(), DenialReason> {
    let target = target.ok_or(DenialReason::KeyNotFound)?;

    let status = target.key.status_at(now);
    if status != KeyStatus::Active {
        return Err(DenialReason::NotActive(status));
    }
    if !target.reservation.status.allows_keys() {
        return Err(DenialReason::ReservationInactive);
    }
    if target.reservation.nfc_lock_id != lock_id {
        return Err(DenialReason::LockMismatch);
    }
    Ok(())
}

/// Verify a presented key against a lock.
///
/// Writes exactly one access event per call. A grant also bumps the key's
/// `access_count` and `last_used`; if the key was changed by a lifecycle
/// write between the read and the count, the attempt is recorded and
/// answered as a denial.
///
/// Denials are an `Ok` response with `is_valid = false`. Only storage
/// failures surface as errors.
pub async fn verify_key<S: KeyStore>(
    store: &S,
    request: VerifyKeyRequest,
    now: DateTime<Utc>,
) -> Result<VerifyKeyResponse, AppError> {
    let target = match Uuid::parse_str(request.key_uuid.trim()) {
        Ok(key_uuid) => store.find_lock_target(key_uuid).await?,
        Err(_) => None,
    };

    let decision = evaluate(target.as_ref(), &request.lock_id, now);

    let event = NewAccessEvent {
        id: Uuid::new_v4(),
        key_id: target.as_ref().map(|t| t.key.id),
        presented_key: request.key_uuid.clone(),
        lock_id: request.lock_id.clone(),
        device_info: request.device_info,
        location: request.location,
        outcome: if decision.is_ok() {
            AccessOutcome::Granted
        } else {
            AccessOutcome::Denied
        },
        reason: decision.as_ref().err().map(ToString::to_string),
        occurred_at: now,
    };

    let outcome = store.record_access(event).await?;

    match (outcome, target) {
        (AccessOutcome::Granted, Some(target)) => {
            tracing::info!(
                key_id = %target.key.id,
                lock_id = %request.lock_id,
                room = %target.reservation.room_number,
                "access granted"
            );
            Ok(VerifyKeyResponse::granted(
                target.reservation.room_number.clone(),
                target.reservation.guest_name(),
            ))
        }
        _ => {
            match decision {
                Err(reason) => tracing::warn!(
                    key_uuid = %request.key_uuid,
                    lock_id = %request.lock_id,
                    %reason,
                    "access denied"
                ),
                Ok(()) => tracing::warn!(
                    key_uuid = %request.key_uuid,
                    lock_id = %request.lock_id,
                    "access denied, key changed during verification"
                ),
            }
            Ok(VerifyKeyResponse::denied())
        }
    }
}
