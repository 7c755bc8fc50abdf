//! Lifecycle and delivery audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of lifecycle or delivery event recorded against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    KeyCreated,
    KeyActivated,
    KeyDeactivated,
    KeyExtended,
    KeyRevoked,
    EmailSent,
    EmailFailed,
    SmsSent,
    SmsFailed,
}

impl KeyEventKind {
    /// Value stored in the `key_events.event_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyEventKind::KeyCreated => "key_created",
            KeyEventKind::KeyActivated => "key_activated",
            KeyEventKind::KeyDeactivated => "key_deactivated",
            KeyEventKind::KeyExtended => "key_extended",
            KeyEventKind::KeyRevoked => "key_revoked",
            KeyEventKind::EmailSent => "email_sent",
            KeyEventKind::EmailFailed => "email_failed",
            KeyEventKind::SmsSent => "sms_sent",
            KeyEventKind::SmsFailed => "sms_failed",
        }
    }
}

/// Represents a key event record from the database.
///
/// Rows in `key_events` are append-only.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct KeyEvent {
    pub id: Uuid,
    pub key_id: Uuid,
    pub event_type: String,

    /// User who triggered the event, when one did
    pub actor: Option<Uuid>,

    pub details: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A key event that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewKeyEvent {
    pub id: Uuid,
    pub key_id: Uuid,
    pub kind: KeyEventKind,
    pub actor: Option<Uuid>,
    pub details: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewKeyEvent {
    pub fn new(key_id: Uuid, kind: KeyEventKind, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key_id,
            kind,
            actor: None,
            details: None,
            occurred_at,
        }
    }

    pub fn by(mut self, actor: Option<Uuid>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Materialize the row as the store would return it.
    pub fn into_record(self) -> KeyEvent {
        KeyEvent {
            id: self.id,
            key_id: self.key_id,
            event_type: self.kind.as_str().to_string(),
            actor: self.actor,
            details: self.details,
            occurred_at: self.occurred_at,
        }
    }
}

/// Pagination for event listings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub skip: i64,

    #[serde(default = "crate::models::digital_key::default_limit")]
    pub limit: i64,
}

impl Default for EventPage {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: crate::models::digital_key::default_limit(),
        }
    }
}
