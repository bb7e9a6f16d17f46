//! Storage layer tests for the session store (in-memory `SQLite`).

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tgstore_core::StorePool;
use tgstore_core::clock::ManualClock;
use tgstore_core::db::open_sqlite_in_memory;

use crate::schema::{SCHEMA_VERSION, USERNAME_TTL};
use crate::{InitOutcome, InputPeer, PeerRecord, SessionStore, StoreError};

const T0: i64 = 1_700_000_000;

async fn test_store(namespace: &str) -> (SessionStore, Arc<ManualClock>) {
    let pool = open_sqlite_in_memory().await.unwrap();
    store_on(namespace, pool).await
}

async fn store_on(namespace: &str, pool: StorePool) -> (SessionStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = SessionStore::new(namespace, pool, None).with_clock(clock.clone());
    store.initialize().await.unwrap();
    (store, clock)
}

fn peer(id: i64, access_hash: i64, peer_type: &str, username: &str, phone: &str) -> PeerRecord {
    PeerRecord {
        id,
        access_hash: Some(access_hash),
        peer_type: peer_type.to_string(),
        username: Some(username.to_string()),
        phone_number: Some(phone.to_string()),
    }
}

/// A Postgres pool that has never connected; any I/O on it fails.
fn unreachable_pool() -> StorePool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy("postgres://nobody@127.0.0.1:1/none")
        .unwrap()
        .into()
}

async fn last_update_on(store: &SessionStore, id: i64) -> i64 {
    let StorePool::Sqlite(pool) = store.pool() else {
        panic!("tests run on SQLite");
    };
    let sql = format!(
        "SELECT last_update_on FROM \"main\".{} WHERE id = $1",
        crate::schema::quote_ident(&format!("{}:peers", store.namespace()))
    );
    sqlx::query_scalar(&sql).bind(id).fetch_one(pool).await.unwrap()
}

// === Lifecycle ===

#[tokio::test]
async fn initialize_twice_takes_existing_branch() {
    let (store, _) = test_store("t1").await;
    assert_eq!(store.initialize().await.unwrap(), InitOutcome::Existing);

    // Still exactly one session and one version row.
    assert_eq!(store.dc_id().await.unwrap(), 2);
    assert_eq!(store.version().await.unwrap(), SCHEMA_VERSION);
}

#[tokio::test]
async fn fresh_store_reports_created() {
    let pool = open_sqlite_in_memory().await.unwrap();
    let store = SessionStore::new("fresh", pool, None);
    assert_eq!(store.initialize().await.unwrap(), InitOutcome::Created);
    assert_eq!(store.group(), "main");
}

#[tokio::test]
async fn teardown_then_initialize_recreates() {
    let (store, _) = test_store("t1").await;
    store.set_api_id(12345).await.unwrap();

    store.teardown().await.unwrap();
    assert_eq!(store.initialize().await.unwrap(), InitOutcome::Created);
    assert_eq!(store.api_id().await.unwrap(), None);
}

#[tokio::test]
async fn teardown_of_missing_tables_fails() {
    let (store, _) = test_store("t1").await;
    store.teardown().await.unwrap();

    let err = store.teardown().await.unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
}

#[tokio::test]
async fn reads_before_initialize_surface_storage_errors() {
    let pool = open_sqlite_in_memory().await.unwrap();
    let store = SessionStore::new("never", pool, None);
    assert!(matches!(
        store.auth_key().await.unwrap_err(),
        StoreError::Storage(_)
    ));
}

#[tokio::test]
async fn shutdown_leaves_pool_open() {
    let (store, _) = test_store("t1").await;
    store.shutdown().await;

    let StorePool::Sqlite(pool) = store.pool() else {
        panic!("tests run on SQLite");
    };
    assert!(!pool.is_closed());
    assert_eq!(store.dc_id().await.unwrap(), 2);
}

// === Session accessors ===

#[tokio::test]
async fn session_defaults_after_create() {
    let (store, _) = test_store("t1").await;

    assert_eq!(store.dc_id().await.unwrap(), 2);
    assert_eq!(store.api_id().await.unwrap(), None);
    assert_eq!(store.test_mode().await.unwrap(), None);
    assert_eq!(store.auth_key().await.unwrap(), None);
    assert_eq!(store.date().await.unwrap(), 0);
    assert_eq!(store.user_id().await.unwrap(), None);
    assert_eq!(store.is_bot().await.unwrap(), None);
}

#[tokio::test]
async fn session_writes_read_back_last_value() {
    let (store, _) = test_store("t1").await;
    let auth_key: Vec<u8> = (0..=255).collect();

    store.set_dc_id(4).await.unwrap();
    store.set_api_id(611_335).await.unwrap();
    store.set_test_mode(false).await.unwrap();
    store.set_auth_key(auth_key.clone()).await.unwrap();
    store.set_date(1_699_999_999).await.unwrap();
    store.set_user_id(9_876_543_210_i64).await.unwrap();
    store.set_is_bot(true).await.unwrap();

    assert_eq!(store.dc_id().await.unwrap(), 4);
    assert_eq!(store.api_id().await.unwrap(), Some(611_335));
    assert_eq!(store.test_mode().await.unwrap(), Some(false));
    assert_eq!(store.auth_key().await.unwrap(), Some(auth_key));
    assert_eq!(store.date().await.unwrap(), 1_699_999_999);
    assert_eq!(store.user_id().await.unwrap(), Some(9_876_543_210));
    assert_eq!(store.is_bot().await.unwrap(), Some(true));

    store.set_dc_id(1).await.unwrap();
    assert_eq!(store.dc_id().await.unwrap(), 1);
}

#[tokio::test]
async fn nullable_columns_can_be_cleared() {
    let (store, _) = test_store("t1").await;
    store.set_auth_key(vec![1_u8, 2, 3]).await.unwrap();
    store.set_auth_key(None::<Vec<u8>>).await.unwrap();
    assert_eq!(store.auth_key().await.unwrap(), None);
}

#[tokio::test]
async fn persist_now_stamps_clock_time() {
    let (store, clock) = test_store("t1").await;
    store.persist_now().await.unwrap();
    assert_eq!(i64::from(store.date().await.unwrap()), T0);

    clock.advance(60);
    store.persist_now().await.unwrap();
    assert_eq!(i64::from(store.date().await.unwrap()), T0 + 60);
}

#[tokio::test]
async fn version_overwrites_without_history() {
    let (store, _) = test_store("t1").await;
    assert_eq!(store.version().await.unwrap(), 1);

    store.set_version(3).await.unwrap();
    store.set_version(2).await.unwrap();
    assert_eq!(store.version().await.unwrap(), 2);
}

// === Peers ===

#[tokio::test]
async fn peer_lookups_by_every_key() {
    let (store, _) = test_store("t1").await;
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    let expected = InputPeer::User {
        user_id: 100,
        access_hash: 555,
    };
    assert_eq!(store.get_peer_by_id(100_i64).await.unwrap(), expected);
    assert_eq!(store.get_peer_by_username("alice").await.unwrap(), expected);
    assert_eq!(store.get_peer_by_phone_number("+1555").await.unwrap(), expected);
}

#[tokio::test]
async fn missing_peers_are_not_found() {
    let (store, _) = test_store("t1").await;

    let err = store.get_peer_by_id(1_i64).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let err = store.get_peer_by_username("nobody").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let err = store.get_peer_by_phone_number("+0").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn reupsert_overwrites_fields_and_advances_timestamp() {
    let (store, clock) = test_store("t1").await;
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();
    assert_eq!(last_update_on(&store, 100).await, T0);

    clock.advance(10);
    store
        .update_peers(&[peer(100, 777, "bot", "alice_bot", "+1666")])
        .await
        .unwrap();
    assert_eq!(last_update_on(&store, 100).await, T0 + 10);

    let expected = InputPeer::User {
        user_id: 100,
        access_hash: 777,
    };
    assert_eq!(store.get_peer_by_id(100_i64).await.unwrap(), expected);
    assert_eq!(store.get_peer_by_username("alice_bot").await.unwrap(), expected);
    assert!(store.get_peer_by_username("alice").await.unwrap_err().is_not_found());
    assert!(store.get_peer_by_phone_number("+1555").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn timestamp_never_moves_backwards() {
    let (store, clock) = test_store("t1").await;
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    clock.set(T0 - 3_600);
    store
        .update_peers(&[peer(100, 556, "user", "alice", "+1555")])
        .await
        .unwrap();

    assert_eq!(last_update_on(&store, 100).await, T0);
    assert_eq!(
        store.get_peer_by_id(100_i64).await.unwrap(),
        InputPeer::User {
            user_id: 100,
            access_hash: 556
        }
    );
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_keep_the_last() {
    let (store, _) = test_store("t1").await;
    store
        .update_peers(&[
            peer(100, 1, "user", "first", "+1"),
            peer(100, 2, "user", "second", "+2"),
        ])
        .await
        .unwrap();

    assert_eq!(
        store.get_peer_by_username("second").await.unwrap(),
        InputPeer::User {
            user_id: 100,
            access_hash: 2
        }
    );
}

#[tokio::test]
async fn username_freshness_boundary() {
    let (store, clock) = test_store("t1").await;
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    clock.advance(USERNAME_TTL - 1);
    assert!(store.get_peer_by_username("alice").await.is_ok());

    clock.advance(1);
    assert!(store.get_peer_by_username("alice").await.is_ok());

    clock.advance(1);
    let err = store.get_peer_by_username("alice").await.unwrap_err();
    assert!(matches!(err, StoreError::Expired(_)));
    assert!(err.is_not_found());

    // Expired rows stay and remain reachable by other keys.
    assert!(store.get_peer_by_id(100_i64).await.is_ok());
    assert!(store.get_peer_by_phone_number("+1555").await.is_ok());
}

#[tokio::test]
async fn reupsert_revives_expired_username() {
    let (store, clock) = test_store("t1").await;
    let alice = peer(100, 555, "user", "alice", "+1555");
    store.update_peers(std::slice::from_ref(&alice)).await.unwrap();

    clock.advance(USERNAME_TTL + 1);
    assert!(store.get_peer_by_username("alice").await.is_err());

    store.update_peers(&[alice]).await.unwrap();
    assert!(store.get_peer_by_username("alice").await.is_ok());
}

#[tokio::test]
async fn freshness_check_survives_extreme_timestamps() {
    let (store, clock) = test_store("t1").await;
    clock.set(i64::MIN);
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    clock.set(i64::MAX);
    let err = store.get_peer_by_username("alice").await.unwrap_err();
    assert!(matches!(err, StoreError::Expired(_)));
}

#[tokio::test]
async fn peers_without_optional_fields() {
    let (store, _) = test_store("t1").await;
    store
        .update_peers(&[PeerRecord {
            id: -1_001_234_567_890,
            access_hash: None,
            peer_type: "channel".to_string(),
            username: None,
            phone_number: None,
        }])
        .await
        .unwrap();

    assert_eq!(
        store.get_peer_by_id(-1_001_234_567_890_i64).await.unwrap(),
        InputPeer::Channel {
            channel_id: 1_234_567_890,
            access_hash: 0
        }
    );
}

#[tokio::test]
async fn unknown_stored_type_fails_conversion() {
    let (store, _) = test_store("t1").await;
    store
        .update_peers(&[peer(1, 1, "forum", "f", "+9")])
        .await
        .unwrap();

    let err = store.get_peer_by_id(1_i64).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidPeerType(_)));
}

#[tokio::test]
async fn upsert_after_teardown_fails() {
    let (store, _) = test_store("t1").await;
    store.teardown().await.unwrap();

    let err = store
        .update_peers(&[peer(1, 1, "user", "a", "+1")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
}

// === No storage access ===

#[tokio::test]
async fn non_integer_id_is_invalid_key_before_io() {
    let store = SessionStore::new("t1", unreachable_pool(), None);

    let err = store.get_peer_by_id("100").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidKey(_)));

    // The same pool fails as soon as storage is touched.
    let err = store.get_peer_by_id(100_i64).await.unwrap_err();
    assert!(matches!(err, StoreError::Storage(_)));
}

#[tokio::test]
async fn empty_upsert_is_a_no_op() {
    let store = SessionStore::new("t1", unreachable_pool(), None);
    store.update_peers(&[]).await.unwrap();
    assert_eq!(store.group(), "pyrogram");
}

// === Namespacing ===

#[tokio::test]
async fn namespaces_are_isolated() {
    let pool = open_sqlite_in_memory().await.unwrap();
    let (a, _) = store_on("a", pool.clone()).await;
    let (b, _) = store_on("b", pool).await;

    a.set_user_id(1_i64).await.unwrap();
    a.update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    assert_eq!(b.user_id().await.unwrap(), None);
    assert!(b.get_peer_by_id(100_i64).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn quotes_in_namespace_are_escaped() {
    let (store, _) = test_store("we\"ird; DROP TABLE x").await;
    store
        .update_peers(&[peer(100, 555, "user", "alice", "+1555")])
        .await
        .unwrap();

    assert_eq!(store.version().await.unwrap(), SCHEMA_VERSION);
    assert!(store.get_peer_by_username("alice").await.is_ok());
    store.teardown().await.unwrap();
}

// === Concurrency ===

#[tokio::test]
async fn concurrent_initialize_creates_once() {
    let pool = open_sqlite_in_memory().await.unwrap();
    let store = Arc::new(SessionStore::new("race", pool, None));

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.initialize().await }
    });
    let second = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.initialize().await }
    });

    let mut outcomes = vec![
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];
    outcomes.sort_by_key(|outcome| *outcome == InitOutcome::Existing);
    assert_eq!(outcomes, [InitOutcome::Created, InitOutcome::Existing]);
    assert_eq!(store.version().await.unwrap(), SCHEMA_VERSION);
}

#[tokio::test]
async fn concurrent_writers_are_serialized() {
    let (store, _) = test_store("t1").await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for i in 0..8_i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .update_peers(&[peer(i, i * 10, "user", &format!("u{i}"), &format!("+{i}"))])
                .await
                .unwrap();
            store.set_user_id(i).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for i in 0..8_i64 {
        assert_eq!(
            store.get_peer_by_username(&format!("u{i}")).await.unwrap(),
            InputPeer::User {
                user_id: i,
                access_hash: i * 10
            }
        );
    }
    assert!(store.user_id().await.unwrap().is_some());
}
