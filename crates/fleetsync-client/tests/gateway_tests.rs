//! Integration tests for the store client
//!
//! These tests run the client against the in-process mock store, so the
//! session handling is exercised over real HTTP.

use std::time::Duration;

use fleetsync_client::testing::{MockStore, MockStoreOptions};
use fleetsync_client::{Credentials, SaveRecord, SaveRequest, StoreError, TextEncoding};
use fleetsync_core::EntityClass;
use futures::future::join_all;

async fn start_store(options: MockStoreOptions) -> MockStore {
    MockStore::start(options).await.expect("mock store starts")
}

const VEHICLE_LOOKUP: &str = "SELECT VEHICLE_ID, PLATE FROM FLT_VEHICLE WHERE PLATE IN ('ABC1234')";

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_authenticate_stores_token() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();

    client.authenticate().await.unwrap();

    assert!(client.is_authenticated());
    assert_eq!(store.login_count(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_are_authentication_errors() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store
        .client_with(Credentials::new("sync", "wrong"))
        .unwrap();

    let err = client.authenticate().await.unwrap_err();

    assert!(matches!(err, StoreError::Authentication(_)), "got {err:?}");
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_authenticate_is_single_flight() {
    let store = start_store(MockStoreOptions {
        login_delay: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let client = store.client().unwrap();

    let results = join_all((0..8).map(|_| {
        let client = client.clone();
        async move { client.authenticate().await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.login_count(), 1);
}

#[tokio::test]
async fn test_failed_login_reaches_every_waiter() {
    let store = start_store(MockStoreOptions {
        login_delay: Duration::from_millis(200),
        ..Default::default()
    })
    .await;
    let client = store
        .client_with(Credentials::new("sync", "wrong"))
        .unwrap();

    let results = join_all((0..4).map(|_| {
        let client = client.clone();
        async move { client.authenticate().await }
    }))
    .await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(StoreError::Authentication(_)))));
    assert_eq!(store.login_count(), 1);
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_login_after_failure_starts_a_new_attempt() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store
        .client_with(Credentials::new("sync", "wrong"))
        .unwrap();

    assert!(client.authenticate().await.is_err());
    assert!(client.authenticate().await.is_err());

    assert_eq!(store.login_count(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_login() {
    let store = start_store(MockStoreOptions {
        login_delay: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    store.register(EntityClass::Vehicle, "12", "ABC1234");
    let client = store.client().unwrap();

    let results = join_all((0..5).map(|_| {
        let client = client.clone();
        async move { client.query(VEHICLE_LOOKUP).await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.login_count(), 1);
    assert_eq!(store.query_count(), 5);
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn test_request_logs_in_lazily() {
    let store = start_store(MockStoreOptions::default()).await;
    store.register(EntityClass::Vehicle, "12", "ABC1234");
    let client = store.client().unwrap();

    let result = client.query(VEHICLE_LOOKUP).await.unwrap();
    let rows = result.rows().unwrap();

    assert_eq!(store.login_count(), 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("VEHICLE_ID"), Some("12".into()));
    assert_eq!(rows[0].text("PLATE"), Some("ABC1234".into()));
}

#[tokio::test]
async fn test_expired_session_is_renewed_once() {
    let store = start_store(MockStoreOptions::default()).await;
    store.register(EntityClass::Vehicle, "12", "ABC1234");
    let client = store.client().unwrap();

    client.query(VEHICLE_LOOKUP).await.unwrap();
    store.expire_sessions();
    let result = client.query(VEHICLE_LOOKUP).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(store.login_count(), 2);
    // the rejected call never reaches the query handler
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn test_second_expiry_is_a_hard_error() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();
    store.reject_all_sessions(true);

    let err = client.query(VEHICLE_LOOKUP).await.unwrap_err();

    assert!(err.is_session_expired(), "got {err:?}");
    // initial login plus exactly one renewal
    assert_eq!(store.login_count(), 2);
}

#[tokio::test]
async fn test_domain_error_carries_store_message() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();
    store.fail_next_queries(1);

    let err = client.query(VEHICLE_LOOKUP).await.unwrap_err();

    match err {
        StoreError::RemoteService { service, message } => {
            assert_eq!(service, "DbExplorerSP.executeQuery");
            assert!(message.contains("ORA-12541"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // domain errors are not retried by the client
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn test_unknown_table_is_remote_error() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();

    let err = client.query("SELECT 1 FROM NOWHERE").await.unwrap_err();
    assert!(matches!(err, StoreError::RemoteService { .. }));
}

#[tokio::test]
async fn test_latin1_responses_are_decoded() {
    let store = start_store(MockStoreOptions {
        encoding: TextEncoding::Latin1,
        ..Default::default()
    })
    .await;
    store.register(EntityClass::Vehicle, "12", "AÇÃ1234");
    let client = store.client().unwrap();

    let result = client
        .query("SELECT VEHICLE_ID, PLATE FROM FLT_VEHICLE WHERE PLATE IN ('AÇÃ1234')")
        .await
        .unwrap();
    let rows = result.rows().unwrap();

    assert_eq!(rows[0].text("PLATE"), Some("AÇÃ1234".into()));
}

#[tokio::test]
async fn test_configured_encoding_wins_over_declared_charset() {
    let store = start_store(MockStoreOptions {
        encoding: TextEncoding::Latin1,
        declared_charset: Some("utf-8"),
        ..Default::default()
    })
    .await;
    store.register(EntityClass::Vehicle, "12", "AÇÃ1234");
    let client = store.client().unwrap();

    let result = tokio_test::assert_ok!(
        client
            .query("SELECT VEHICLE_ID, PLATE FROM FLT_VEHICLE WHERE PLATE IN ('AÇÃ1234')")
            .await
    );
    assert_eq!(result.rows().unwrap()[0].text("PLATE"), Some("AÇÃ1234".into()));

    let rejected = store
        .client_with(Credentials::new("sync", "wrong"))
        .unwrap()
        .authenticate()
        .await;
    match tokio_test::assert_err!(rejected) {
        StoreError::Authentication(message) => assert!(message.contains("Usuário"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_response_is_decode_error() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();
    client.authenticate().await.unwrap();
    store.malformed_responses(true);

    let err = client.query(VEHICLE_LOOKUP).await.unwrap_err();
    assert!(matches!(err, StoreError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let store = start_store(MockStoreOptions {
        response_delay: Duration::from_millis(500),
        ..Default::default()
    })
    .await;
    let client = fleetsync_client::StoreClient::with_options(
        &store.base_url(),
        Credentials::new("sync", "secret"),
        TextEncoding::Utf8,
        Duration::from_millis(100),
        Duration::from_secs(1),
    )
    .unwrap();

    let err = client.query(VEHICLE_LOOKUP).await.unwrap_err();
    assert!(matches!(err, StoreError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn test_save_persists_rows() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();

    let mut request = SaveRequest::new(
        "VehiclePosition",
        vec!["OBSERVED_AT".into(), "PLATE".into()],
    );
    request.push(
        SaveRecord::new("VEHICLE_ID", "12")
            .value(0, "01/03/2024 10:05:00")
            .value(1, "ABC1234"),
    );
    client.save(&request).await.unwrap();

    let positions = store.positions(EntityClass::Vehicle);
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].key, "12");
    assert_eq!(positions[0].observed_at, "01/03/2024 10:05:00");
}

#[tokio::test]
async fn test_logout_drops_session() {
    let store = start_store(MockStoreOptions::default()).await;
    let client = store.client().unwrap();
    client.authenticate().await.unwrap();

    client.logout().await.unwrap();

    assert!(!client.is_authenticated());
    assert_eq!(store.logout_count(), 1);
    // nothing to do without a session
    client.logout().await.unwrap();
    assert_eq!(store.logout_count(), 1);
}
