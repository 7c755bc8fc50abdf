//! Lock verification models.
//!
//! Every verification attempt, granted or denied, produces one
//! `AccessEvent`. The table is append-only.
//!
//! # Verification Flow
//!
//! 1. A lock posts `VerifyKeyRequest` to `POST /api/v1/verify/key`
//! 2. The key is looked up by its token and evaluated at the current time
//! 3. One `AccessEvent` is written with the outcome and internal reason
//! 4. The lock receives `VerifyKeyResponse`, which never names the reason

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "access_outcome", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccessOutcome {
    Granted,
    Denied,
}

/// Represents an access event record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AccessEvent {
    pub id: Uuid,

    /// NULL when the presented token matched no key
    pub key_id: Option<Uuid>,

    /// Token exactly as the lock presented it
    pub presented_key: String,

    pub lock_id: String,
    pub device_info: Option<String>,
    pub location: Option<String>,
    pub outcome: AccessOutcome,

    /// Internal denial reason. Never returned to locks.
    pub reason: Option<String>,

    pub occurred_at: DateTime<Utc>,
}

/// An access event that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewAccessEvent {
    pub id: Uuid,
    pub key_id: Option<Uuid>,
    pub presented_key: String,
    pub lock_id: String,
    pub device_info: Option<String>,
    pub location: Option<String>,
    pub outcome: AccessOutcome,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewAccessEvent {
    pub fn into_record(self) -> AccessEvent {
        AccessEvent {
            id: self.id,
            key_id: self.key_id,
            presented_key: self.presented_key,
            lock_id: self.lock_id,
            device_info: self.device_info,
            location: self.location,
            outcome: self.outcome,
            reason: self.reason,
            occurred_at: self.occurred_at,
        }
    }
}

/// Request sent by a lock (or the NFC simulator).
///
/// # JSON Example
///
/// ```json
/// {
///   "key_uuid": "7d0c8f5e-9b1a-4c3e-8f2d-1a2b3c4d5e6f",
///   "lock_id": "LOCK-0412",
///   "device_info": "NFC Simulator v1",
///   "location": "Floor 4"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyKeyRequest {
    /// Kept as text: locks may present anything, and malformed tokens are audited too
    pub key_uuid: String,
    pub lock_id: String,
    pub device_info: Option<String>,
    pub location: Option<String>,
}

/// Response returned to the lock.
///
/// `room_number` and `guest_name` are only present on a grant. Internal
/// identifiers are never included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyKeyResponse {
    pub is_valid: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
}

impl VerifyKeyResponse {
    pub fn granted(room_number: String, guest_name: String) -> Self {
        Self {
            is_valid: true,
            message: "Access granted".to_string(),
            room_number: Some(room_number),
            guest_name: Some(guest_name),
        }
    }

    /// Uniform denial. Every denial reason produces this same body.
    pub fn denied() -> Self {
        Self {
            is_valid: false,
            message: "Access denied".to_string(),
            room_number: None,
            guest_name: None,
        }
    }
}
