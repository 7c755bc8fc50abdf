//! PostgreSQL implementation of the key store.
//!
//! # Concurrency
//!
//! - Lifecycle writes lock the key row with `FOR UPDATE` for the duration of
//!   the decision, so concurrent activate/deactivate/extend/revoke calls on
//!   one key apply one after another.
//! - Regeneration revokes the old key and inserts the new one in the same
//!   transaction.
//! - Access counting is an in-place `access_count + 1`, never a
//!   read-modify-write in the application.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::access_event::{AccessEvent, AccessOutcome, NewAccessEvent};
use crate::models::digital_key::{DigitalKey, ListKeysQuery};
use crate::models::key_event::{EventPage, KeyEvent, NewKeyEvent};
use crate::models::reservation::ReservationDetails;
use crate::store::{GRANT_RACE_REASON, KeyStore, LockTarget};

const RESERVATION_DETAILS_QUERY: &str = r#"
    SELECT r.id,
           r.guest_id,
           r.status,
           r.check_in,
           r.check_out,
           rm.room_number,
           rm.nfc_lock_id,
           g.first_name AS guest_first_name,
           g.last_name AS guest_last_name,
           g.email AS guest_email,
           g.phone AS guest_phone
    FROM reservations r
    JOIN rooms rm ON rm.id = r.room_id
    JOIN guests g ON g.id = r.guest_id
    WHERE r.id = $1
"#;

#[derive(Debug, Clone)]
pub struct PgKeyStore {
    pub pool: DbPool,
}

impl PgKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_key_event<'e, E>(executor: E, event: &NewKeyEvent) -> Result<(), sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO key_events (id, key_id, event_type, actor, details, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id)
    .bind(event.key_id)
    .bind(event.kind.as_str())
    .bind(event.actor)
    .bind(&event.details)
    .bind(event.occurred_at)
    .execute(executor)
    .await?;

    Ok(())
}

impl KeyStore for PgKeyStore {
    async fn find_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<ReservationDetails>, AppError> {
        let reservation = sqlx::query_as::<_, ReservationDetails>(RESERVATION_DETAILS_QUERY)
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(reservation)
    }

    async fn insert_key(
        &self,
        key: &DigitalKey,
        event: &NewKeyEvent,
    ) -> Result<DigitalKey, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = match insert_key_row(&mut tx, key).await {
            Ok(row) => row,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        insert_key_event(&mut *tx, event).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn find_key(&self, key_id: Uuid) -> Result<Option<DigitalKey>, AppError> {
        let key = sqlx::query_as::<_, DigitalKey>("SELECT * FROM digital_keys WHERE id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn list_keys(&self, query: &ListKeysQuery) -> Result<Vec<DigitalKey>, AppError> {
        let keys = sqlx::query_as::<_, DigitalKey>(
            r#"
            SELECT * FROM digital_keys
            WHERE ($1::uuid IS NULL OR reservation_id = $1)
            ORDER BY created_at DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(query.reservation_id)
        .bind(query.skip)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn modify_key<F>(&self, key_id: Uuid, apply: F) -> Result<DigitalKey, AppError>
    where
        F: FnOnce(&mut DigitalKey) -> Result<Option<NewKeyEvent>, AppError> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let mut key = lock_key(&mut tx, key_id).await?;

        let event = match apply(&mut key) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tx.rollback().await?;
                return Ok(key);
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };

        let updated = update_key(&mut tx, &key, event.occurred_at).await?;
        insert_key_event(&mut *tx, &event).await?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn replace_key<F>(
        &self,
        key_id: Uuid,
        replacement: &DigitalKey,
        created: &NewKeyEvent,
        retire: F,
    ) -> Result<DigitalKey, AppError>
    where
        F: FnOnce(&mut DigitalKey) -> Result<Option<NewKeyEvent>, AppError> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let mut key = lock_key(&mut tx, key_id).await?;

        // Every early return below drops `tx`, rolling back the retirement
        if let Some(event) = retire(&mut key)? {
            update_key(&mut tx, &key, event.occurred_at).await?;
            insert_key_event(&mut *tx, &event).await?;
        }

        let inserted = insert_key_row(&mut tx, replacement).await?;
        insert_key_event(&mut *tx, created).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn find_lock_target(&self, key_uuid: Uuid) -> Result<Option<LockTarget>, AppError> {
        let Some(key) =
            sqlx::query_as::<_, DigitalKey>("SELECT * FROM digital_keys WHERE key_uuid = $1")
                .bind(key_uuid)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };

        let reservation = sqlx::query_as::<_, ReservationDetails>(RESERVATION_DETAILS_QUERY)
            .bind(key.reservation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(reservation.map(|reservation| LockTarget { key, reservation }))
    }

    async fn record_access(&self, mut event: NewAccessEvent) -> Result<AccessOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        if event.outcome == AccessOutcome::Granted {
            let counted = match event.key_id {
                Some(key_id) => count_use(&mut tx, key_id, event.occurred_at).await?,
                None => false,
            };

            if !counted {
                event.outcome = AccessOutcome::Denied;
                event.reason = Some(GRANT_RACE_REASON.to_string());
            }
        }

        sqlx::query(
            r#"
            INSERT INTO access_events (
                id,
                key_id,
                presented_key,
                lock_id,
                device_info,
                location,
                outcome,
                reason,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.key_id)
        .bind(&event.presented_key)
        .bind(&event.lock_id)
        .bind(&event.device_info)
        .bind(&event.location)
        .bind(event.outcome)
        .bind(&event.reason)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(event.outcome)
    }

    async fn append_key_event(&self, event: &NewKeyEvent) -> Result<(), AppError> {
        insert_key_event(&self.pool, event).await?;
        Ok(())
    }

    async fn list_key_events(
        &self,
        key_id: Uuid,
        page: EventPage,
    ) -> Result<Vec<KeyEvent>, AppError> {
        let events = sqlx::query_as::<_, KeyEvent>(
            r#"
            SELECT * FROM key_events
            WHERE key_id = $1
            ORDER BY occurred_at DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(key_id)
        .bind(page.skip)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn list_access_events(
        &self,
        key_id: Uuid,
        page: EventPage,
    ) -> Result<Vec<AccessEvent>, AppError> {
        let events = sqlx::query_as::<_, AccessEvent>(
            r#"
            SELECT * FROM access_events
            WHERE key_id = $1
            ORDER BY occurred_at DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(key_id)
        .bind(page.skip)
        .bind(page.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

/// Insert a key row.
///
/// The partial unique index allows one live key per reservation and pass
/// type; a second one maps to `KeyAlreadyIssued`.
async fn insert_key_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &DigitalKey,
) -> Result<DigitalKey, AppError> {
    let inserted = sqlx::query_as::<_, DigitalKey>(
        r#"
        INSERT INTO digital_keys (
            id,
            key_uuid,
            reservation_id,
            pass_type,
            pass_url,
            valid_from,
            valid_until,
            is_active,
            created_at,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        RETURNING *
        "#,
    )
    .bind(key.id)
    .bind(key.key_uuid)
    .bind(key.reservation_id)
    .bind(key.pass_type)
    .bind(&key.pass_url)
    .bind(key.valid_from)
    .bind(key.valid_until)
    .bind(key.is_active)
    .bind(key.created_at)
    .fetch_one(&mut **tx)
    .await;

    match inserted {
        Ok(row) => Ok(row),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(AppError::KeyAlreadyIssued)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load a key and hold its row lock until the transaction ends.
async fn lock_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key_id: Uuid,
) -> Result<DigitalKey, AppError> {
    sqlx::query_as::<_, DigitalKey>("SELECT * FROM digital_keys WHERE id = $1 FOR UPDATE")
        .bind(key_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::KeyNotFound)
}

/// Write back the lifecycle fields of a locked key.
async fn update_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &DigitalKey,
    updated_at: DateTime<Utc>,
) -> Result<DigitalKey, sqlx::Error> {
    sqlx::query_as::<_, DigitalKey>(
        r#"
        UPDATE digital_keys
        SET pass_url = $2,
            valid_until = $3,
            is_active = $4,
            revoked_at = $5,
            activated_at = $6,
            updated_at = $7
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(key.id)
    .bind(&key.pass_url)
    .bind(key.valid_until)
    .bind(key.is_active)
    .bind(key.revoked_at)
    .bind(key.activated_at)
    .bind(updated_at)
    .fetch_one(&mut **tx)
    .await
}

/// Count one granted use, in place.
///
/// The WHERE clause re-checks the grant conditions under the row lock that
/// UPDATE takes, so a deactivation or revocation that committed after the
/// verification read wins.
async fn count_use(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        r#"
        UPDATE digital_keys
        SET access_count = access_count + 1,
            last_used = $2
        WHERE id = $1
          AND is_active = true
          AND revoked_at IS NULL
          AND valid_from <= $2
          AND valid_until >= $2
        "#,
    )
    .bind(key_id)
    .bind(now)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(updated == 1)
}
