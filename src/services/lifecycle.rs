//! Key lifecycle service - the only writer of key state.
//!
//! This service handles:
//! - Issuing keys for eligible reservations
//! - Activate, deactivate, extend and revoke transitions
//! - Regenerating a key (revoke and reissue)
//! - Authorization of the acting user
//!
//! # State Machine
//!
//! ```text
//! created --activate (inside window)--> active --deactivate--> created
//! any state except revoked --revoke--> revoked (terminal)
//! created | active --(time passes valid_until)--> expired (derived, not stored)
//! ```
//!
//! Each transition is a pure function over a locked [`DigitalKey`]. A
//! transition either fails before touching the record or reports whether it
//! changed anything; the store writes only when it did.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        access_event::AccessEvent,
        digital_key::{DigitalKey, ListKeysQuery, PassType},
        key_event::{EventPage, KeyEvent, KeyEventKind, NewKeyEvent},
        reservation::ReservationDetails,
    },
    services::{pass::PassIssuer, validity},
    store::KeyStore,
};

/// Largest page size accepted by listing endpoints.
pub const MAX_PAGE_SIZE: i64 = 500;

/// Switch a key on.
///
/// Returns `Ok(false)` when the key is already on (no-op).
///
/// # Errors
///
/// - `KeyRevoked`: Key has been revoked
/// - `NotCurrentlyValid`: `now` is outside `[valid_from, valid_until]`
pub fn activate(key: &mut DigitalKey, now: DateTime<Utc>) -> Result<bool, AppError> {
    if key.is_revoked() {
        return Err(AppError::KeyRevoked);
    }
    if !validity::within_window(key.valid_from, key.valid_until, now) {
        return Err(AppError::NotCurrentlyValid);
    }
    if key.is_active {
        return Ok(false);
    }

    key.is_active = true;
    key.activated_at = Some(now);
    Ok(true)
}

/// Switch a key off. Unconditional and idempotent.
pub fn deactivate(key: &mut DigitalKey) -> bool {
    if !key.is_active {
        return false;
    }
    key.is_active = false;
    true
}

/// Move `valid_until` forward and re-sign the pass URL.
///
/// Does not switch the key on.
///
/// # Errors
///
/// - `KeyRevoked`: Key has been revoked
/// - `InvalidExtension`: new end is not after the current end, or not in the future
pub fn extend(
    key: &mut DigitalKey,
    new_valid_until: DateTime<Utc>,
    now: DateTime<Utc>,
    passes: &PassIssuer,
) -> Result<(), AppError> {
    if key.is_revoked() {
        return Err(AppError::KeyRevoked);
    }
    if new_valid_until <= key.valid_until || new_valid_until <= now {
        return Err(AppError::InvalidExtension);
    }

    key.valid_until = new_valid_until;
    key.pass_url = passes.pass_url(key.pass_type, key.key_uuid, new_valid_until);
    Ok(())
}

/// Revoke a key for good.
///
/// Returns `false` if it was already revoked.
pub fn revoke(key: &mut DigitalKey, now: DateTime<Utc>) -> bool {
    if key.is_revoked() {
        return false;
    }
    key.is_active = false;
    key.revoked_at = Some(now);
    true
}

/// Check that a reservation may receive keys.
pub fn ensure_eligible(reservation: &ReservationDetails) -> Result<(), AppError> {
    if !reservation.status.allows_keys() {
        let reason = format!("status is {}", reservation.status.as_str());
        return Err(AppError::InvalidReservationState(reason));
    }
    if reservation.check_in > reservation.check_out {
        return Err(AppError::InvalidReservationState(
            "check-in is after check-out".to_string(),
        ));
    }
    Ok(())
}

/// Build a fresh, switched-off key covering the reservation's stay.
pub fn new_key(
    reservation: &ReservationDetails,
    pass_type: PassType,
    passes: &PassIssuer,
    now: DateTime<Utc>,
) -> DigitalKey {
    let key_uuid = Uuid::new_v4();
    DigitalKey {
        id: Uuid::new_v4(),
        key_uuid,
        reservation_id: reservation.id,
        pass_type,
        pass_url: passes.pass_url(pass_type, key_uuid, reservation.check_out),
        valid_from: reservation.check_in,
        valid_until: reservation.check_out,
        is_active: false,
        revoked_at: None,
        activated_at: None,
        last_used: None,
        access_count: 0,
        created_at: now,
        updated_at: now,
    }
}

fn created_event(
    key: &DigitalKey,
    reservation: &ReservationDetails,
    actor: &AuthContext,
    now: DateTime<Utc>,
) -> NewKeyEvent {
    let room = &reservation.room_number;
    NewKeyEvent::new(key.id, KeyEventKind::KeyCreated, now)
        .by(Some(actor.user_id))
        .with_details(format!("{} pass for room {room}", key.pass_type.as_str()))
}

/// Issue a key for a reservation.
///
/// # Process
///
/// 1. Load the reservation with its room and guest
/// 2. Check it is confirmed or checked in
/// 3. Build the key and its signed pass URL
/// 4. Insert key and `key_created` event atomically
///
/// Delivery is the caller's business and never undoes the insert.
///
/// # Errors
///
/// - `Forbidden`: Caller is not staff
/// - `ReservationNotFound`: No such reservation
/// - `InvalidReservationState`: Reservation cannot receive keys
/// - `KeyAlreadyIssued`: A live key of this pass type exists
pub async fn create_key<S: KeyStore>(
    store: &S,
    passes: &PassIssuer,
    actor: &AuthContext,
    reservation_id: Uuid,
    pass_type: PassType,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    actor.require_staff()?;

    let reservation = store
        .find_reservation(reservation_id)
        .await?
        .ok_or(AppError::ReservationNotFound)?;

    ensure_eligible(&reservation)?;

    let key = new_key(&reservation, pass_type, passes, now);
    let event = created_event(&key, &reservation, actor, now);

    let key = store.insert_key(&key, &event).await?;

    tracing::info!(
        key_id = %key.id,
        reservation_id = %reservation_id,
        pass_type = pass_type.as_str(),
        "digital key issued"
    );

    Ok(key)
}

/// Fetch a key the caller is allowed to see.
///
/// Staff see every key; guests only keys of their own reservations.
pub async fn get_key<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
) -> Result<DigitalKey, AppError> {
    let key = store.find_key(key_id).await?.ok_or(AppError::KeyNotFound)?;
    ensure_owner(store, actor, &key).await?;
    Ok(key)
}

async fn ensure_owner<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key: &DigitalKey,
) -> Result<(), AppError> {
    if actor.is_staff() {
        return Ok(());
    }

    let reservation = store.find_reservation(key.reservation_id).await?;
    match reservation {
        Some(r) if r.guest_id == actor.user_id => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

fn validate_page(skip: i64, limit: i64) -> Result<(), AppError> {
    if skip < 0 {
        return Err(AppError::InvalidRequest(
            "skip must not be negative".to_string(),
        ));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// List keys, optionally for one reservation. Staff only.
pub async fn list_keys<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    query: &ListKeysQuery,
) -> Result<Vec<DigitalKey>, AppError> {
    actor.require_staff()?;
    validate_page(query.skip, query.limit)?;
    store.list_keys(query).await
}

/// Activate a key.
///
/// Guests may activate keys of their own reservations.
///
/// # Errors
///
/// - `KeyNotFound`, `Forbidden`
/// - `KeyRevoked`: Key has been revoked
/// - `NotCurrentlyValid`: Outside the validity window
pub async fn activate_key<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    get_key(store, actor, key_id).await?;

    let key = store
        .modify_key(key_id, |key| {
            Ok(activate(key, now)?.then(|| {
                NewKeyEvent::new(key.id, KeyEventKind::KeyActivated, now)
                    .by(Some(actor.user_id))
            }))
        })
        .await?;

    tracing::info!(key_id = %key_id, user_id = %actor.user_id, "digital key activated");
    Ok(key)
}

/// Deactivate a key. Staff only; idempotent.
pub async fn deactivate_key<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    actor.require_staff()?;

    let key = store
        .modify_key(key_id, |key| {
            Ok(deactivate(key).then(|| {
                NewKeyEvent::new(key.id, KeyEventKind::KeyDeactivated, now)
                    .by(Some(actor.user_id))
            }))
        })
        .await?;

    tracing::info!(key_id = %key_id, user_id = %actor.user_id, "digital key deactivated");
    Ok(key)
}

/// Extend a key's validity. Staff only.
///
/// # Errors
///
/// - `KeyRevoked`: Key has been revoked
/// - `InvalidExtension`: New end date does not extend the window or is in the past
pub async fn extend_key<S: KeyStore>(
    store: &S,
    passes: &PassIssuer,
    actor: &AuthContext,
    key_id: Uuid,
    new_valid_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    actor.require_staff()?;

    let key = store
        .modify_key(key_id, |key| {
            let previous = key.valid_until;
            extend(key, new_valid_until, now, passes)?;
            Ok(Some(
                NewKeyEvent::new(key.id, KeyEventKind::KeyExtended, now)
                    .by(Some(actor.user_id))
                    .with_details(format!(
                        "valid_until {} -> {}",
                        previous.to_rfc3339(),
                        new_valid_until.to_rfc3339()
                    )),
            ))
        })
        .await?;

    tracing::info!(key_id = %key_id, valid_until = %key.valid_until, "digital key extended");
    Ok(key)
}

/// Revoke a key. Staff only; terminal.
pub async fn revoke_key<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    actor.require_staff()?;

    let key = store
        .modify_key(key_id, |key| {
            Ok(revoke(key, now).then(|| {
                NewKeyEvent::new(key.id, KeyEventKind::KeyRevoked, now)
                    .by(Some(actor.user_id))
            }))
        })
        .await?;

    tracing::info!(key_id = %key_id, user_id = %actor.user_id, "digital key revoked");
    Ok(key)
}

/// Revoke a key and issue a replacement for the same reservation and pass type.
///
/// The reservation is checked before the old key is touched, so an
/// ineligible reservation leaves the old key as it was. Revocation and
/// reissue commit together: if the replacement cannot be stored, the old
/// key stays live.
pub async fn regenerate_key<S: KeyStore>(
    store: &S,
    passes: &PassIssuer,
    actor: &AuthContext,
    key_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DigitalKey, AppError> {
    actor.require_staff()?;

    let old = store.find_key(key_id).await?.ok_or(AppError::KeyNotFound)?;
    let reservation = store
        .find_reservation(old.reservation_id)
        .await?
        .ok_or(AppError::ReservationNotFound)?;
    ensure_eligible(&reservation)?;

    let replacement = new_key(&reservation, old.pass_type, passes, now);
    let created = created_event(&replacement, &reservation, actor, now);

    let key = store
        .replace_key(key_id, &replacement, &created, |key| {
            Ok(revoke(key, now).then(|| {
                NewKeyEvent::new(key.id, KeyEventKind::KeyRevoked, now)
                    .by(Some(actor.user_id))
            }))
        })
        .await?;

    tracing::info!(
        key_id = %key.id,
        replaces = %key_id,
        reservation_id = %reservation.id,
        "digital key regenerated"
    );

    Ok(key)
}

/// Lifecycle and delivery history of a key, newest first. Staff only.
pub async fn key_events<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
    page: EventPage,
) -> Result<Vec<KeyEvent>, AppError> {
    actor.require_staff()?;
    validate_page(page.skip, page.limit)?;
    store.find_key(key_id).await?.ok_or(AppError::KeyNotFound)?;
    store.list_key_events(key_id, page).await
}

/// Lock verification history of a key, newest first. Staff only.
pub async fn access_events<S: KeyStore>(
    store: &S,
    actor: &AuthContext,
    key_id: Uuid,
    page: EventPage,
) -> Result<Vec<AccessEvent>, AppError> {
    actor.require_staff()?;
    validate_page(page.skip, page.limit)?;
    store.find_key(key_id).await?.ok_or(AppError::KeyNotFound)?;
    store.list_access_events(key_id, page).await
}
