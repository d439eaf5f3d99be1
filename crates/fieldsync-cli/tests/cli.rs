//! End-to-end tests for the `fieldsync` binary against a mock backend.

mod common;

use std::fs;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{TestEnv, ticket_json};

async fn mock_active_ticket(env: &TestEnv, id: Option<&str>) {
    let body = match id {
        Some(id) => ticket_json(id),
        None => json!(null),
    };
    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/active-ticket"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&env.server)
        .await;
}

#[tokio::test]
async fn login_persists_session_and_whoami_reads_it() {
    let env = TestEnv::new().await;
    env.login().await;

    assert_eq!(fs::read_to_string(env.store_file("secure/token")).unwrap(), "A1");
    assert_eq!(
        fs::read_to_string(env.store_file("secure/refreshToken")).unwrap(),
        "R1"
    );
    assert!(env.data_dir().join("settings.json").exists());

    let stdout = env.run_success(&["whoami"]).await;
    assert!(stdout.contains("Dana Engineer"), "stdout: {}", stdout);
    assert!(stdout.contains("dana@example.com"));
}

#[tokio::test]
async fn rejected_login_fails_without_writing_a_session() {
    let env = TestEnv::new().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })),
        )
        .mount(&env.server)
        .await;

    let output = env
        .run(&["login", "--email", "dana@example.com", "--password", "wrong"])
        .await;
    assert!(!output.status.success());
    assert!(!env.store_file("secure/token").exists());

    let output = env.run(&["whoami"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Not logged in"));
}

#[tokio::test]
async fn tickets_active_sends_stored_token() {
    let env = TestEnv::new().await;
    env.login().await;

    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/active-ticket"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket_json("t1")))
        .expect(1)
        .mount(&env.server)
        .await;

    let stdout = env.run_success(&["tickets", "active", "--json"]).await;
    let ticket: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(ticket["_id"], "t1");
    assert_eq!(ticket["ticketId"], "TCK-t1");
}

#[tokio::test]
async fn logout_clears_store_and_tracking() {
    let env = TestEnv::new().await;
    env.login().await;
    env.run_success(&["track", "start", "t1", "--allow-background-location"])
        .await;
    assert!(env.tracking_file().exists());

    env.run_success(&["logout"]).await;

    assert!(!env.store_file("secure/token").exists());
    assert!(!env.store_file("secure/refreshToken").exists());
    assert!(!env.store_file("general/user").exists());
    assert!(!env.store_file("general/activeTicketId").exists());
    assert!(!env.tracking_file().exists());

    // A second logout is harmless.
    env.run_success(&["logout"]).await;
}

#[tokio::test]
async fn track_start_requires_background_permission() {
    let env = TestEnv::new().await;
    env.login().await;

    let output = env.run(&["track", "start", "t1"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("background location"));
    assert!(!env.tracking_file().exists());
    assert!(!env.store_file("general/activeTicketId").exists());

    env.run_success(&["track", "start", "t1", "--allow-background-location"])
        .await;
    assert!(env.tracking_file().exists());
    assert_eq!(
        fs::read_to_string(env.store_file("general/activeTicketId")).unwrap(),
        "t1"
    );

    let stdout = env.run_success(&["track", "status"]).await;
    assert!(stdout.contains("active"));
    assert!(stdout.contains("t1"));
}

#[tokio::test]
async fn report_location_posts_for_the_tracked_ticket() {
    let env = TestEnv::new().await;
    env.login().await;
    env.run_success(&["track", "start", "t1", "--allow-background-location"])
        .await;
    mock_active_ticket(&env, Some("t1")).await;

    Mock::given(method("POST"))
        .and(path("/api/tickets/engineer/location/t1"))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({ "latitude": 51.5, "longitude": -0.12 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&env.server)
        .await;

    let stdout = env
        .run_success(&[
            "report-location",
            "--latitude",
            "51.5",
            "--longitude",
            "-0.12",
            "--json",
        ])
        .await;
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["outcome"], "reported");
    assert_eq!(outcome["ticket"], "t1");
    assert!(env.tracking_file().exists());
}

#[tokio::test]
async fn report_location_stops_tracking_when_ticket_changed() {
    let env = TestEnv::new().await;
    env.login().await;
    env.run_success(&["track", "start", "t1", "--allow-background-location"])
        .await;
    mock_active_ticket(&env, Some("t2")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&env.server)
        .await;

    let stdout = env
        .run_success(&[
            "report-location",
            "--latitude",
            "1.0",
            "--longitude",
            "2.0",
            "--json",
        ])
        .await;
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["outcome"], "deregistered");
    assert!(!env.tracking_file().exists());
    assert!(!env.store_file("general/activeTicketId").exists());

    // The session itself survives.
    assert!(env.store_file("secure/token").exists());
}

#[tokio::test]
async fn report_location_without_marker_does_nothing() {
    let env = TestEnv::new().await;
    env.login().await;

    let stdout = env.run_success(&["report-location", "--json"]).await;
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["outcome"], "noMarker");
}

#[tokio::test]
async fn failed_refresh_ends_the_session() {
    let env = TestEnv::new().await;
    env.login().await;

    Mock::given(method("GET"))
        .and(path("/api/tickets/engineer/available"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&env.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh-token"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Refresh token revoked" })),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let output = env.run(&["tickets", "available"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("fieldsync login"));

    assert!(!env.store_file("secure/token").exists());
    assert!(!env.store_file("secure/refreshToken").exists());
    assert!(!env.store_file("general/user").exists());
}
