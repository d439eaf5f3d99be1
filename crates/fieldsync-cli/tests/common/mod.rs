#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An isolated data directory plus a mock backend.
pub struct TestEnv {
    pub server: MockServer,
    home: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            home: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.home.path().join("data")
    }

    /// Path of a key file inside the session store.
    pub fn store_file(&self, relative: &str) -> PathBuf {
        self.data_dir().join("session").join(relative)
    }

    pub fn tracking_file(&self) -> PathBuf {
        self.data_dir().join("tracking.json")
    }

    /// Run the CLI binary with the data directory and backend pinned.
    pub async fn run(&self, args: &[&str]) -> Output {
        run_cli(args, self.home.path(), &self.data_dir(), &self.server.uri()).await
    }

    /// Run the CLI and expect success, returning stdout.
    pub async fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args).await;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Log in as the default engineer with tokens `A1`/`R1`.
    pub async fn login(&self) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "A1",
                "refreshToken": "R1",
                "user": user_json()
            })))
            .mount(&self.server)
            .await;

        self.run_success(&["login", "--email", "dana@example.com", "--password", "hunter2"])
            .await;
    }
}

pub async fn run_cli(args: &[&str], home: &Path, data_dir: &Path, api_url: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fieldsync"))
        .args(args)
        .env("HOME", home)
        .env("FIELDSYNC_DATA_DIR", data_dir)
        .env("FIELDSYNC_API_URL", api_url)
        .env("NO_COLOR", "1")
        .env_remove("FIELDSYNC_PASSWORD")
        .env_remove("RUST_LOG")
        .output()
        .await
        .expect("Failed to execute CLI")
}

pub fn user_json() -> Value {
    json!({
        "_id": "u-1",
        "fullName": "Dana Engineer",
        "email": "dana@example.com",
        "role": "Engineer",
        "isPasswordTemporary": false
    })
}

pub fn ticket_json(id: &str) -> Value {
    json!({
        "_id": id,
        "ticketId": format!("TCK-{}", id),
        "status": "In Progress",
        "companyName": "Acme Utilities"
    })
}
