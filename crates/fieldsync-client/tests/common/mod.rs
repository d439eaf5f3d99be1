//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::MockServer;

use fieldsync_client::{ApiClient, ClientConfig, LocationTracker, SessionManager};
use fieldsync_core::{
    AccessToken, BaseUrl, CredentialPair, LocationPermissions, PermissionStatus, RefreshToken,
    Result, TaskScheduler, TokenStore, TrackingOptions,
};
use fieldsync_store::MemoryStore;

/// Config pointing at a mock backend.
pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(BaseUrl::new(server.uri()).unwrap())
}

/// A client over a fresh in-memory store.
pub fn client(server: &MockServer) -> (ApiClient, MemoryStore) {
    let store = MemoryStore::new();
    let client = ApiClient::new(config(server), Arc::new(store.clone())).unwrap();
    (client, store)
}

pub fn pair(access: &str, refresh: &str) -> CredentialPair {
    CredentialPair::new(AccessToken::new(access), RefreshToken::new(refresh))
}

/// A client holding `access`/`refresh` both in memory and in the store.
pub async fn logged_in_client(
    server: &MockServer,
    access: &str,
    refresh: &str,
) -> (ApiClient, MemoryStore) {
    let (client, store) = client(server);
    let pair = pair(access, refresh);
    store.save(&pair).await.unwrap();
    client.set_credentials(pair);
    (client, store)
}

pub fn ticket_json(id: &str) -> Value {
    json!({
        "_id": id,
        "ticketId": format!("TCK-{}", id),
        "status": "In Progress",
        "companyName": "Acme Utilities"
    })
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

/// Scheduler that records registration in memory.
#[derive(Debug, Default)]
pub struct FakeScheduler {
    registered: AtomicBool,
}

impl FakeScheduler {
    pub fn registered() -> Self {
        Self {
            registered: AtomicBool::new(true),
        }
    }

    pub fn is_set(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskScheduler for FakeScheduler {
    async fn is_registered(&self) -> Result<bool> {
        Ok(self.is_set())
    }

    async fn register(&self, _options: &TrackingOptions) -> Result<()> {
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Permission prompts with fixed answers.
#[derive(Debug, Clone, Copy)]
pub struct FixedPermissions {
    pub foreground: PermissionStatus,
    pub background: PermissionStatus,
}

impl FixedPermissions {
    pub fn granted() -> Self {
        Self {
            foreground: PermissionStatus::Granted,
            background: PermissionStatus::Granted,
        }
    }
}

#[async_trait]
impl LocationPermissions for FixedPermissions {
    async fn request_foreground(&self) -> Result<PermissionStatus> {
        Ok(self.foreground)
    }

    async fn request_background(&self) -> Result<PermissionStatus> {
        Ok(self.background)
    }
}

/// A session manager wired to a mock backend, with its collaborators.
pub struct Harness {
    pub session: SessionManager,
    pub store: MemoryStore,
    pub scheduler: Arc<FakeScheduler>,
}

pub fn harness(server: &MockServer, permissions: FixedPermissions) -> Harness {
    let (client, store) = client(server);
    let scheduler = Arc::new(FakeScheduler::default());
    let tracker = LocationTracker::new(
        Arc::new(store.clone()),
        scheduler.clone(),
        Arc::new(permissions),
    );
    Harness {
        session: SessionManager::new(client, tracker),
        store,
        scheduler,
    }
}
