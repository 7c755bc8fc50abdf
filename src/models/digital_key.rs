//! Digital key data models and API request/response types.
//!
//! This module defines:
//! - `DigitalKey`: Database entity representing an issued room key
//! - `KeyStatus`: Derived lifecycle status (never stored)
//! - Request types for create, extend and list operations
//! - `DigitalKeyResponse`: Response body returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::validity;

/// Wallet platform a pass is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "pass_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PassType {
    Apple,
    Google,
}

impl PassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassType::Apple => "apple",
            PassType::Google => "google",
        }
    }
}

/// Lifecycle status of a key at a given instant.
///
/// Computed by [`validity::key_status`] on every read. Stale values are never
/// persisted because the current time moves independently of writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Created,
    Active,
    Expired,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Created => "created",
            KeyStatus::Active => "active",
            KeyStatus::Expired => "expired",
            KeyStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a digital key record from the database.
///
/// # Database Table
///
/// Maps to the `digital_keys` table. Each key:
/// - Belongs to one reservation (deleted only when the reservation is)
/// - Carries an external `key_uuid` token that locks and passes present
/// - Holds a validity window with `valid_from <= valid_until`
///
/// # Revocation
///
/// `revoked_at` doubles as the revoked flag. Once set it is never cleared.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct DigitalKey {
    /// Internal identifier
    pub id: Uuid,

    /// Token shared with wallets and locks
    pub key_uuid: Uuid,

    /// Owning reservation
    pub reservation_id: Uuid,

    pub pass_type: PassType,

    /// Signed reference to the generated wallet artifact
    pub pass_url: String,

    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,

    /// Mutated only by the lifecycle service
    pub is_active: bool,

    pub revoked_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,

    /// Mutated only by lock verification
    pub last_used: Option<DateTime<Utc>>,

    /// Number of granted lock verifications. Never decreases.
    pub access_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DigitalKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Status of this key at `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> KeyStatus {
        validity::key_status(
            self.valid_from,
            self.valid_until,
            self.is_active,
            self.is_revoked(),
            now,
        )
    }
}

/// Request body for issuing a new key.
///
/// # JSON Example
///
/// ```json
/// {
///   "reservation_id": "550e8400-e29b-41d4-a716-446655440000",
///   "pass_type": "apple",
///   "send_email": true,
///   "alternative_email": "guest@example.com"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateKeyRequest {
    pub reservation_id: Uuid,

    pub pass_type: PassType,

    /// Email the pass after issuing (defaults to true)
    #[serde(default = "default_send_email")]
    pub send_email: bool,

    /// Overrides the guest's stored email address
    pub alternative_email: Option<String>,

    #[serde(default)]
    pub send_sms: bool,

    #[serde(default)]
    pub phone_numbers: Vec<String>,
}

fn default_send_email() -> bool {
    true
}

/// Request body for extending a key's validity window.
#[derive(Debug, Deserialize)]
pub struct ExtendKeyRequest {
    pub new_end_date: DateTime<Utc>,
}

/// Query parameters for `GET /api/v1/keys`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListKeysQuery {
    pub reservation_id: Option<Uuid>,

    #[serde(default)]
    pub skip: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub fn default_limit() -> i64 {
    100
}

/// Response body for key endpoints.
///
/// Same fields as [`DigitalKey`] plus the status evaluated at response time.
#[derive(Debug, Serialize)]
pub struct DigitalKeyResponse {
    pub id: Uuid,
    pub key_uuid: Uuid,
    pub reservation_id: Uuid,
    pub pass_type: PassType,
    pub pass_url: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub status: KeyStatus,
    pub activated_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub access_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DigitalKeyResponse {
    pub fn at(key: DigitalKey, now: DateTime<Utc>) -> Self {
        let status = key.status_at(now);
        Self {
            id: key.id,
            key_uuid: key.key_uuid,
            reservation_id: key.reservation_id,
            pass_type: key.pass_type,
            pass_url: key.pass_url,
            valid_from: key.valid_from,
            valid_until: key.valid_until,
            is_active: key.is_active,
            status,
            activated_at: key.activated_at,
            revoked_at: key.revoked_at,
            last_used: key.last_used,
            access_count: key.access_count,
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}
