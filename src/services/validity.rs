//! Validity evaluation for digital keys.
//!
//! The single place that turns stored key fields plus the current time into
//! a [`KeyStatus`]. Every read path (API responses, activation checks, lock
//! verification) goes through here.

use chrono::{DateTime, Utc};

use crate::models::digital_key::KeyStatus;

/// Status of a key at `now`.
///
/// - `Revoked` if the key was revoked, regardless of anything else
/// - `Expired` if `now` is past `valid_until`
/// - `Active` if the key is switched on and `now` has reached `valid_from`
/// - `Created` otherwise
pub fn key_status(
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    is_active: bool,
    revoked: bool,
    now: DateTime<Utc>,
) -> KeyStatus {
    if revoked {
        KeyStatus::Revoked
    } else if now > valid_until {
        KeyStatus::Expired
    } else if is_active && now >= valid_from {
        KeyStatus::Active
    } else {
        KeyStatus::Created
    }
}

/// Whether `now` lies in the closed interval `[valid_from, valid_until]`.
pub fn within_window(
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    valid_from <= now && now <= valid_until
}
