use uuid::Uuid;

use virtual_key_server::models::access_event::{AccessOutcome, VerifyKeyRequest};
use virtual_key_server::models::digital_key::PassType;
use virtual_key_server::models::reservation::ReservationStatus;
use virtual_key_server::services::{lifecycle, verification};
use virtual_key_server::store::GRANT_RACE_REASON;

use crate::helpers::{LOCK_ID, MemoryKeyStore, at, passes, staff, test_reservation};

fn request(key_uuid: impl ToString, lock_id: &str) -> VerifyKeyRequest {
    VerifyKeyRequest {
        key_uuid: key_uuid.to_string(),
        lock_id: lock_id.to_string(),
        device_info: Some("NFC Simulator".to_string()),
        location: Some("Floor 4".to_string()),
    }
}

/// Issue and activate a key, returning its id and token.
async fn active_key(store: &MemoryKeyStore, reservation_id: Uuid) -> (Uuid, Uuid) {
    let key = lifecycle::create_key(
        store,
        &passes(),
        &staff(),
        reservation_id,
        PassType::Apple,
        at(1),
    )
    .await
    .unwrap();
    lifecycle::activate_key(store, &staff(), key.id, at(2))
        .await
        .unwrap();
    (key.id, key.key_uuid)
}

#[tokio::test]
async fn should_grant_active_key_at_its_lock_and_count_use() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;

    let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
        .await
        .unwrap();

    assert!(response.is_valid);
    assert_eq!(response.message, "Access granted");
    assert_eq!(response.room_number.as_deref(), Some("412"));
    assert_eq!(response.guest_name.as_deref(), Some("Ada Lovelace"));

    let key = store.key(key_id);
    assert_eq!(key.access_count, 1);
    assert_eq!(key.last_used, Some(at(2)));

    let events = store.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AccessOutcome::Granted);
    assert_eq!(events[0].key_id, Some(key_id));
}

#[tokio::test]
async fn should_deny_expired_key_without_counting() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;

    let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(4))
        .await
        .unwrap();

    assert!(!response.is_valid);
    assert_eq!(response.message, "Access denied");
    assert_eq!(store.key(key_id).access_count, 0);

    let events = store.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AccessOutcome::Denied);
    assert_eq!(events[0].reason.as_deref(), Some("key is expired"));
}

#[tokio::test]
async fn should_give_identical_answers_for_every_denial_cause() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;

    let unknown = verification::verify_key(&store, request(Uuid::new_v4(), LOCK_ID), at(2))
        .await
        .unwrap();
    let garbage = verification::verify_key(&store, request("not-a-uuid", LOCK_ID), at(2))
        .await
        .unwrap();
    let wrong_lock = verification::verify_key(&store, request(key_uuid, "LOCK-9999"), at(2))
        .await
        .unwrap();

    lifecycle::deactivate_key(&store, &staff(), key_id, at(2))
        .await
        .unwrap();
    let inactive = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
        .await
        .unwrap();

    assert_eq!(unknown, garbage);
    assert_eq!(unknown, wrong_lock);
    assert_eq!(unknown, inactive);
    assert!(!unknown.is_valid);
    assert!(unknown.room_number.is_none() && unknown.guest_name.is_none());

    let events = store.access_events();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.outcome == AccessOutcome::Denied));
    assert_eq!(events[0].key_id, None);
    assert_eq!(events[1].presented_key, "not-a-uuid");
    assert_eq!(
        events[2].reason.as_deref(),
        Some("lock does not belong to the key's room")
    );
    assert_eq!(store.key(key_id).access_count, 0);
}

#[tokio::test]
async fn should_deny_when_reservation_was_cancelled() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (_, key_uuid) = active_key(&store, reservation.id).await;
    store.set_reservation_status(reservation.id, ReservationStatus::Cancelled);

    let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
        .await
        .unwrap();

    assert!(!response.is_valid);
}

#[tokio::test]
async fn should_deny_revoked_key() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;
    lifecycle::revoke_key(&store, &staff(), key_id, at(2))
        .await
        .unwrap();

    let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
        .await
        .unwrap();

    assert!(!response.is_valid);
    assert_eq!(
        store.access_events()[0].reason.as_deref(),
        Some("key is revoked")
    );
}

#[tokio::test]
async fn should_record_denial_when_key_is_revoked_mid_verification() {
    let reservation = test_reservation();
    let mut store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;
    store.revoke_after_lookup = true;

    let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
        .await
        .unwrap();

    assert!(!response.is_valid);
    assert_eq!(store.key(key_id).access_count, 0);
    let events = store.access_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AccessOutcome::Denied);
    assert_eq!(events[0].reason.as_deref(), Some(GRANT_RACE_REASON));
}

#[tokio::test]
async fn should_count_every_grant() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let (key_id, key_uuid) = active_key(&store, reservation.id).await;

    for _ in 0..3 {
        let response = verification::verify_key(&store, request(key_uuid, LOCK_ID), at(2))
            .await
            .unwrap();
        assert!(response.is_valid);
    }

    assert_eq!(store.key(key_id).access_count, 3);
    assert_eq!(store.access_events().len(), 3);
}
