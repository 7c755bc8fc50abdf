use chrono::Duration;
use uuid::Uuid;

use virtual_key_server::error::AppError;
use virtual_key_server::middleware::auth::AuthContext;
use virtual_key_server::models::digital_key::{DigitalKey, KeyStatus, ListKeysQuery, PassType};
use virtual_key_server::models::key_event::EventPage;
use virtual_key_server::models::reservation::ReservationStatus;
use virtual_key_server::services::lifecycle;

use crate::helpers::{MemoryKeyStore, at, passes, staff, test_reservation};

async fn create(
    store: &MemoryKeyStore,
    actor: &AuthContext,
    reservation_id: Uuid,
    pass_type: PassType,
) -> Result<DigitalKey, AppError> {
    lifecycle::create_key(store, &passes(), actor, reservation_id, pass_type, at(1)).await
}

async fn issued_key(store: &MemoryKeyStore, reservation_id: Uuid) -> Uuid {
    create(store, &staff(), reservation_id, PassType::Apple)
        .await
        .unwrap()
        .id
}

async fn activated(store: &MemoryKeyStore, key_id: Uuid) -> DigitalKey {
    lifecycle::activate_key(store, &staff(), key_id, at(2))
        .await
        .unwrap()
}

async fn revoked(store: &MemoryKeyStore, key_id: Uuid) -> DigitalKey {
    lifecycle::revoke_key(store, &staff(), key_id, at(2))
        .await
        .unwrap()
}

// ── create ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_issue_inactive_key_covering_the_stay() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());

    let key = create(&store, &staff(), reservation.id, PassType::Google)
        .await
        .unwrap();

    assert!(!key.is_active);
    assert_eq!(key.valid_from, reservation.check_in);
    assert_eq!(key.valid_until, reservation.check_out);
    assert_eq!(key.access_count, 0);
    assert_eq!(key.status_at(at(1)), KeyStatus::Created);
    assert!(passes().verify(&key.pass_url));
    assert!(key.pass_url.contains(&key.key_uuid.to_string()));
    assert_eq!(store.event_types(key.id), vec!["key_created"]);
}

#[tokio::test]
async fn should_reject_unknown_reservation() {
    let store = MemoryKeyStore::default();
    let result = create(&store, &staff(), Uuid::new_v4(), PassType::Apple).await;
    assert!(
        matches!(result, Err(AppError::ReservationNotFound)),
        "got {result:?}"
    );
}

#[tokio::test]
async fn should_reject_reservations_that_cannot_hold_keys() {
    for status in [
        ReservationStatus::Pending,
        ReservationStatus::CheckedOut,
        ReservationStatus::Cancelled,
        ReservationStatus::NoShow,
    ] {
        let mut reservation = test_reservation();
        reservation.status = status;
        let store = MemoryKeyStore::with_reservation(reservation.clone());

        let result = create(&store, &staff(), reservation.id, PassType::Apple).await;

        assert!(
            matches!(result, Err(AppError::InvalidReservationState(_))),
            "{status:?}: got {result:?}"
        );
        assert!(store.data.lock().unwrap().keys.is_empty());
    }
}

#[tokio::test]
async fn should_reject_reservation_with_inverted_dates() {
    let mut reservation = test_reservation();
    reservation.status = ReservationStatus::Confirmed;
    reservation.check_in = at(5);
    let store = MemoryKeyStore::with_reservation(reservation.clone());

    let result = create(&store, &staff(), reservation.id, PassType::Apple).await;
    assert!(matches!(result, Err(AppError::InvalidReservationState(_))));
}

#[tokio::test]
async fn should_reject_second_live_key_of_same_pass_type() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    issued_key(&store, reservation.id).await;

    let result = create(&store, &staff(), reservation.id, PassType::Apple).await;
    assert!(matches!(result, Err(AppError::KeyAlreadyIssued)));

    let google = create(&store, &staff(), reservation.id, PassType::Google).await;
    assert!(google.is_ok());
}

#[tokio::test]
async fn should_forbid_guests_from_issuing() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let guest = AuthContext::guest(reservation.guest_id);

    let result = create(&store, &guest, reservation.id, PassType::Apple).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

// ── activate / deactivate ────────────────────────────────────────────────────

#[tokio::test]
async fn should_activate_inside_window() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;

    let key = activated(&store, key_id).await;

    assert!(key.is_active);
    assert_eq!(key.activated_at, Some(at(2)));
    assert_eq!(key.status_at(at(2)), KeyStatus::Active);
    assert_eq!(
        store.event_types(key_id),
        vec!["key_created", "key_activated"]
    );
}

#[tokio::test]
async fn should_treat_repeated_activation_as_noop() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;

    let first = activated(&store, key_id).await;
    let later = at(2) + Duration::hours(1);
    let second = lifecycle::activate_key(&store, &staff(), key_id, later)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.event_types(key_id).len(), 2);
}

#[tokio::test]
async fn should_refuse_activation_outside_window() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;

    let result = lifecycle::activate_key(&store, &staff(), key_id, at(4)).await;

    assert!(
        matches!(result, Err(AppError::NotCurrentlyValid)),
        "got {result:?}"
    );
    assert!(!store.key(key_id).is_active);
}

#[tokio::test]
async fn should_let_guest_activate_own_key_only() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;

    let stranger = AuthContext::guest(Uuid::new_v4());
    let result = lifecycle::activate_key(&store, &stranger, key_id, at(2)).await;
    assert!(matches!(result, Err(AppError::Forbidden)));
    assert!(!store.key(key_id).is_active);

    let owner = AuthContext::guest(reservation.guest_id);
    let key = lifecycle::activate_key(&store, &owner, key_id, at(2))
        .await
        .unwrap();
    assert!(key.is_active);
}

#[tokio::test]
async fn should_deactivate_idempotently() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    activated(&store, key_id).await;

    let once = lifecycle::deactivate_key(&store, &staff(), key_id, at(2))
        .await
        .unwrap();
    let twice = lifecycle::deactivate_key(&store, &staff(), key_id, at(2))
        .await
        .unwrap();

    assert!(!once.is_active);
    assert_eq!(once, twice);
    assert_eq!(once.status_at(at(2)), KeyStatus::Created);
}

// ── extend ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_extend_and_resign_pass_without_reactivating() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    let before = store.key(key_id);

    let key = lifecycle::extend_key(&store, &passes(), &staff(), key_id, at(5), at(2))
        .await
        .unwrap();

    assert_eq!(key.valid_until, at(5));
    assert!(!key.is_active);
    assert_ne!(key.pass_url, before.pass_url);
    assert!(passes().verify(&key.pass_url));
    assert_eq!(store.event_types(key_id).last().unwrap(), "key_extended");
}

#[tokio::test]
async fn should_reject_backwards_extension_and_leave_record_unchanged() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    let before = store.key(key_id);

    let result = lifecycle::extend_key(&store, &passes(), &staff(), key_id, at(1), at(2)).await;

    assert!(
        matches!(result, Err(AppError::InvalidExtension)),
        "got {result:?}"
    );
    assert_eq!(store.key(key_id), before);
    assert_eq!(store.key(key_id).valid_until, at(3));
}

#[tokio::test]
async fn should_keep_expired_key_expired_until_extended() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    activated(&store, key_id).await;

    assert_eq!(store.key(key_id).status_at(at(4)), KeyStatus::Expired);

    let key = lifecycle::extend_key(&store, &passes(), &staff(), key_id, at(6), at(4))
        .await
        .unwrap();
    // still switched on from before, and now back inside the window
    assert_eq!(key.status_at(at(4)), KeyStatus::Active);
}

// ── revoke / regenerate ──────────────────────────────────────────────────────

#[tokio::test]
async fn should_block_activation_after_revocation() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;

    let key = revoked(&store, key_id).await;
    assert_eq!(key.revoked_at, Some(at(2)));

    let result = lifecycle::activate_key(&store, &staff(), key_id, at(2)).await;
    assert!(
        matches!(result, Err(AppError::KeyRevoked)),
        "got {result:?}"
    );
    assert!(!store.key(key_id).is_active);
    assert_eq!(store.key(key_id).status_at(at(2)), KeyStatus::Revoked);
}

#[tokio::test]
async fn should_keep_revoked_key_revoked() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    activated(&store, key_id).await;
    revoked(&store, key_id).await;

    let extend = lifecycle::extend_key(&store, &passes(), &staff(), key_id, at(9), at(2)).await;
    assert!(matches!(extend, Err(AppError::KeyRevoked)));

    let deactivated = lifecycle::deactivate_key(&store, &staff(), key_id, at(2))
        .await
        .unwrap();
    let again = lifecycle::revoke_key(&store, &staff(), key_id, at(3))
        .await
        .unwrap();

    assert_eq!(deactivated.status_at(at(2)), KeyStatus::Revoked);
    assert_eq!(again.revoked_at, Some(at(2)));
    assert_eq!(
        store.event_types(key_id),
        vec!["key_created", "key_activated", "key_revoked"]
    );
}

#[tokio::test]
async fn should_allow_new_key_once_old_one_is_revoked() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let old_id = issued_key(&store, reservation.id).await;

    let new_key = lifecycle::regenerate_key(&store, &passes(), &staff(), old_id, at(2))
        .await
        .unwrap();

    assert_ne!(new_key.id, old_id);
    assert_ne!(new_key.key_uuid, store.key(old_id).key_uuid);
    assert_eq!(new_key.pass_type, PassType::Apple);
    assert_eq!(new_key.reservation_id, reservation.id);
    assert_eq!(store.key(new_key.id), new_key);
    assert!(store.key(old_id).revoked_at.is_some());
    assert_eq!(
        store.event_types(old_id),
        vec!["key_created", "key_revoked"]
    );
    assert_eq!(store.event_types(new_key.id), vec!["key_created"]);
}

#[tokio::test]
async fn should_not_revoke_when_reservation_is_no_longer_eligible() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    store.set_reservation_status(reservation.id, ReservationStatus::Cancelled);

    let result = lifecycle::regenerate_key(&store, &passes(), &staff(), key_id, at(2)).await;

    assert!(matches!(result, Err(AppError::InvalidReservationState(_))));
    assert!(store.key(key_id).revoked_at.is_none());
}

#[tokio::test]
async fn should_keep_old_key_live_when_replacement_cannot_be_stored() {
    let reservation = test_reservation();
    let mut store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    activated(&store, key_id).await;
    store.fail_inserts = true;

    let result = lifecycle::regenerate_key(&store, &passes(), &staff(), key_id, at(2)).await;

    assert!(matches!(result, Err(AppError::Database(_))));
    let key = store.key(key_id);
    assert!(key.revoked_at.is_none());
    assert_eq!(key.status_at(at(2)), KeyStatus::Active);
    assert_eq!(
        store.event_types(key_id),
        vec!["key_created", "key_activated"]
    );
    assert_eq!(store.data.lock().unwrap().keys.len(), 1);
}

// ── reads ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_list_keys_by_reservation() {
    let first = test_reservation();
    let second = test_reservation();
    let store = MemoryKeyStore::with_reservation(first.clone());
    store.add_reservation(second.clone());
    issued_key(&store, first.id).await;
    issued_key(&store, second.id).await;

    let query = ListKeysQuery {
        reservation_id: Some(first.id),
        skip: 0,
        limit: 100,
    };
    let keys = lifecycle::list_keys(&store, &staff(), &query)
        .await
        .unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].reservation_id, first.id);

    let everything = ListKeysQuery {
        limit: 100,
        ..Default::default()
    };
    let all = lifecycle::list_keys(&store, &staff(), &everything)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn should_reject_bad_page_sizes() {
    let store = MemoryKeyStore::default();
    let query = ListKeysQuery {
        reservation_id: None,
        skip: 0,
        limit: 0,
    };
    let result = lifecycle::list_keys(&store, &staff(), &query).await;
    assert!(matches!(result, Err(AppError::InvalidRequest(_))));
}

#[tokio::test]
async fn should_list_events_newest_first() {
    let reservation = test_reservation();
    let store = MemoryKeyStore::with_reservation(reservation.clone());
    let key_id = issued_key(&store, reservation.id).await;
    activated(&store, key_id).await;
    revoked(&store, key_id).await;

    let page = EventPage::default();
    let events = lifecycle::key_events(&store, &staff(), key_id, page)
        .await
        .unwrap();
    let seen: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(seen, vec!["key_revoked", "key_activated", "key_created"]);

    let missing = lifecycle::key_events(&store, &staff(), Uuid::new_v4(), page).await;
    assert!(matches!(missing, Err(AppError::KeyNotFound)));
}
