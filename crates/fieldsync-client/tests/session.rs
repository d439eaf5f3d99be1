//! Session lifecycle against a mock backend.

mod common;

use std::time::Duration;

use fieldsync_client::{SessionState, TrackingState};
use fieldsync_core::error::PermissionError;
use fieldsync_core::{AccessToken, PermissionStatus, RefreshToken, TokenStore, UserProfile};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{FixedPermissions, harness, pair, ticket_json, user_json};

fn user() -> UserProfile {
    serde_json::from_value(user_json()).unwrap()
}

async fn login(h: &common::Harness, access: &str, refresh: &str) {
    h.session
        .login(user(), AccessToken::new(access), RefreshToken::new(refresh))
        .await
        .unwrap();
}

async fn mount_active_ticket(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/active-ticket"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn assert_fully_logged_out(h: &common::Harness) {
    assert_eq!(h.session.state(), SessionState::Unauthenticated);
    assert!(h.session.client().access_token().is_none());
    assert!(h.session.client().refresh_token().is_none());
    assert!(h.store.load().await.unwrap().is_none());
    assert!(h.store.load_profile().await.unwrap().is_none());
    assert!(h.store.load_active_ticket().await.unwrap().is_none());
    assert!(!h.scheduler.is_set());
}

#[tokio::test]
async fn test_restore_without_stored_session() {
    let server = MockServer::start().await;
    let h = harness(&server, FixedPermissions::granted());

    assert_eq!(h.session.state(), SessionState::Loading);
    assert_eq!(h.session.restore().await, SessionState::Unauthenticated);
    assert!(h.session.client().access_token().is_none());
}

#[tokio::test]
async fn test_restore_primes_client_from_store() {
    let server = MockServer::start().await;
    let h = harness(&server, FixedPermissions::granted());
    h.store.save(&pair("A1", "R1")).await.unwrap();
    h.store.save_profile(&user()).await.unwrap();

    let state = h.session.restore().await;
    let session = state.session().unwrap();
    assert_eq!(session.user.display_name(), "Dana Engineer");
    assert_eq!(session.access_token, AccessToken::new("A1"));
    assert_eq!(h.session.client().refresh_token(), Some(RefreshToken::new("R1")));
}

#[tokio::test]
async fn test_restore_requires_profile_and_tokens() {
    let server = MockServer::start().await;
    let h = harness(&server, FixedPermissions::granted());
    h.store.save(&pair("A1", "R1")).await.unwrap();

    assert_eq!(h.session.restore().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_sign_in_persists_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "A1",
            "refreshToken": "R1",
            "user": user_json()
        })))
        .mount(&server)
        .await;

    let h = harness(&server, FixedPermissions::granted());
    let mut states = h.session.subscribe();

    let user = h.session.sign_in("dana@example.com", "secret").await.unwrap();
    assert_eq!(user.email.as_deref(), Some("dana@example.com"));

    assert!(states.has_changed().unwrap());
    assert!(states.borrow_and_update().is_authenticated());
    assert_eq!(h.store.load().await.unwrap(), Some(pair("A1", "R1")));
    assert_eq!(h.store.load_profile().await.unwrap(), Some(user));
    assert_eq!(h.session.client().access_token(), Some(AccessToken::new("A1")));
}

#[tokio::test]
async fn test_sync_starts_tracking_for_active_ticket() {
    let server = MockServer::start().await;
    mount_active_ticket(&server, ticket_json("t1")).await;

    let h = harness(&server, FixedPermissions::granted());
    login(&h, "A1", "R1").await;

    let sync = h.session.sync_active_ticket().await.unwrap();
    assert_eq!(sync.ticket.unwrap().id.as_str(), "t1");
    assert_eq!(sync.tracking, TrackingState::Started);
    assert!(h.scheduler.is_set());
    assert_eq!(
        h.store.load_active_ticket().await.unwrap().unwrap().as_str(),
        "t1"
    );

    let again = h.session.sync_active_ticket().await.unwrap();
    assert_eq!(again.tracking, TrackingState::AlreadyTracking);
}

#[tokio::test]
async fn test_sync_stops_tracking_without_active_ticket() {
    let server = MockServer::start().await;
    mount_active_ticket(&server, serde_json::Value::Null).await;

    let h = harness(&server, FixedPermissions::granted());
    login(&h, "A1", "R1").await;
    h.session
        .tracker()
        .start(&"t-old".parse().unwrap())
        .await
        .unwrap();

    let sync = h.session.sync_active_ticket().await.unwrap();
    assert!(sync.ticket.is_none());
    assert_eq!(sync.tracking, TrackingState::Stopped);
    assert!(!h.scheduler.is_set());
    assert!(h.store.load_active_ticket().await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_reports_denied_permission() {
    let server = MockServer::start().await;
    mount_active_ticket(&server, ticket_json("t1")).await;

    let h = harness(
        &server,
        FixedPermissions {
            foreground: PermissionStatus::Granted,
            background: PermissionStatus::Denied,
        },
    );
    login(&h, "A1", "R1").await;

    let sync = h.session.sync_active_ticket().await.unwrap();
    assert_eq!(
        sync.tracking,
        TrackingState::PermissionDenied(PermissionError::Background)
    );
    assert!(!h.scheduler.is_set());
    assert!(h.store.load_active_ticket().await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let server = MockServer::start().await;
    mount_active_ticket(&server, ticket_json("t1")).await;

    let h = harness(&server, FixedPermissions::granted());
    login(&h, "A1", "R1").await;
    h.session.sync_active_ticket().await.unwrap();
    assert!(h.scheduler.is_set());

    h.session.logout().await.unwrap();
    assert_fully_logged_out(&h).await;

    // A second logout is a no-op.
    h.session.logout().await.unwrap();
    assert_fully_logged_out(&h).await;
}

#[tokio::test]
async fn test_refresh_failure_forces_logout() {
    let server = MockServer::start().await;
    mount_active_ticket(&server, ticket_json("t1")).await;
    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/history"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Refresh token expired" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, FixedPermissions::granted());
    login(&h, "A1", "R1").await;
    h.session.sync_active_ticket().await.unwrap();
    let watcher = h.session.watch_auth_events();
    let mut states = h.session.subscribe();

    let err = h.session.client().tickets().history().await.unwrap_err();
    assert!(err.requires_login());

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == SessionState::Unauthenticated),
    )
    .await
    .expect("session was not logged out")
    .unwrap();

    assert_fully_logged_out(&h).await;
    watcher.abort();
}

#[tokio::test]
async fn test_refreshed_token_updates_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/history"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/history"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ticket_json("t9")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "A2", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, FixedPermissions::granted());
    login(&h, "A1", "R1").await;
    let watcher = h.session.watch_auth_events();
    let mut states = h.session.subscribe();

    let history = h.session.client().tickets().history().await.unwrap();
    assert_eq!(history.len(), 1);

    let state = tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| {
            state
                .session()
                .is_some_and(|s| s.access_token == AccessToken::new("A2"))
        }),
    )
    .await
    .expect("session token was not updated")
    .unwrap()
    .clone();
    assert!(state.is_authenticated());
    watcher.abort();
}
