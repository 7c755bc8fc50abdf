//! Bearer token model for authentication.
//!
//! Staff and guest sessions authenticate with bearer tokens. Tokens are stored in the database as SHA-256 hashes; issuing them belongs to the account subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    Guest,
}

/// Represents a bearer token record from the database.
///
/// # Database Table
///
/// Maps to the `api_tokens` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `token_hash`: SHA-256 hash of the actual token
/// - `user_id`: User the token was issued to
/// - `role`: Staff or guest
/// - `created_at`: When the token was created
/// - `is_active`: Whether the token is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiToken {
    pub id: Uuid,

    /// SHA-256 hash of the token (64 hex characters)
    pub token_hash: String,

    pub user_id: Uuid,

    pub role: Role,

    pub created_at: DateTime<Utc>,

    /// Inactive tokens are rejected during authentication. This provides a way to end a session without deleting the record.
    pub is_active: bool,
}
