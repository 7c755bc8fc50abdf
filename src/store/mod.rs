//! Key record store.
//!
//! `KeyStore` is the persistence port used by the services. The lifecycle
//! service is the only caller that changes key fields, and it does so only
//! through [`KeyStore::modify_key`] and [`KeyStore::replace_key`], which
//! serialize writers per key.
//! Verification and delivery append audit rows and bump usage counters.

#![allow(async_fn_in_trait)]

pub mod postgres;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::access_event::{AccessEvent, AccessOutcome, NewAccessEvent};
use crate::models::digital_key::{DigitalKey, ListKeysQuery};
use crate::models::key_event::{EventPage, KeyEvent, NewKeyEvent};
use crate::models::reservation::ReservationDetails;

pub use postgres::PgKeyStore;

/// A key together with the reservation, room and guest it opens for.
#[derive(Debug, Clone)]
pub struct LockTarget {
    pub key: DigitalKey,
    pub reservation: ReservationDetails,
}

pub trait KeyStore: Send + Sync {
    async fn find_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationDetails>, AppError>;

    /// Insert a new key and its `key_created` event atomically.
    ///
    /// Fails with `KeyAlreadyIssued` if a live key of the same pass type
    /// exists for the reservation.
    async fn insert_key(
        &self,
        key: &DigitalKey,
        event: &NewKeyEvent,
    ) -> Result<DigitalKey, AppError>;

    async fn find_key(&self, key_id: Uuid) -> Result<Option<DigitalKey>, AppError>;

    /// Newest first, optionally filtered by reservation.
    async fn list_keys(&self, query: &ListKeysQuery) -> Result<Vec<DigitalKey>, AppError>;

    /// Lock the key, let `apply` decide and mutate it, then persist.
    ///
    /// `apply` runs while the key is locked against other writers. If it
    /// returns an error nothing is written. If it returns `Ok(None)` the
    /// transition was a no-op and the current record is returned unchanged.
    /// If it returns an event, the mutated key and the event are written in
    /// one transaction.
    async fn modify_key<F>(&self, key_id: Uuid, apply: F) -> Result<DigitalKey, AppError>
    where
        F: FnOnce(&mut DigitalKey) -> Result<Option<NewKeyEvent>, AppError> + Send;

    /// Retire a key and insert its replacement in one transaction.
    ///
    /// `retire` runs under the same lock as in [`KeyStore::modify_key`]; an
    /// `Ok(None)` leaves the old key as it is. If `retire` fails, or the
    /// replacement cannot be inserted, nothing is written. Returns the
    /// replacement as stored.
    async fn replace_key<F>(
        &self,
        key_id: Uuid,
        replacement: &DigitalKey,
        created: &NewKeyEvent,
        retire: F,
    ) -> Result<DigitalKey, AppError>
    where
        F: FnOnce(&mut DigitalKey) -> Result<Option<NewKeyEvent>, AppError> + Send;

    async fn find_lock_target(&self, key_uuid: Uuid) -> Result<Option<LockTarget>, AppError>;

    /// Append an access event and, for grants, count the use.
    ///
    /// A grant is only counted if the key is still active and inside its
    /// window at `event.occurred_at`; otherwise the event is stored as a
    /// denial. Returns the outcome actually recorded.
    async fn record_access(&self, event: NewAccessEvent) -> Result<AccessOutcome, AppError>;

    async fn append_key_event(&self, event: &NewKeyEvent) -> Result<(), AppError>;

    /// Newest first.
    async fn list_key_events(
        &self,
        key_id: Uuid,
        page: EventPage,
    ) -> Result<Vec<KeyEvent>, AppError>;

    /// Newest first.
    async fn list_access_events(
        &self,
        key_id: Uuid,
        page: EventPage,
    ) -> Result<Vec<AccessEvent>, AppError>;
}

/// Reason stored when a grant loses a race with a lifecycle change.
pub const GRANT_RACE_REASON: &str = "key changed during verification";
