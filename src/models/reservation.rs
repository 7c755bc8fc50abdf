//! Read-only view of reservations.
//!
//! Reservations, rooms and guests are owned by the reservation subsystem.
//! Keys are issued against them and locks are matched through them, but this
//! service never writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::CheckedIn => "checked_in",
            ReservationStatus::CheckedOut => "checked_out",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no_show",
        }
    }

    /// Whether keys may be issued for, and used against, a reservation in this state.
    pub fn allows_keys(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed | ReservationStatus::CheckedIn
        )
    }
}

/// A reservation joined with its room and guest.
///
/// Populated from `reservations JOIN rooms JOIN guests`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationDetails {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub status: ReservationStatus,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,

    pub room_number: String,

    /// Identifier the room's NFC lock reports when verifying a key
    pub nfc_lock_id: String,

    pub guest_first_name: String,
    pub guest_last_name: String,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
}

impl ReservationDetails {
    pub fn guest_name(&self) -> String {
        format!("{} {}", self.guest_first_name, self.guest_last_name)
    }
}
