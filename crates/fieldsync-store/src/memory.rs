//! In-memory session storage.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use fieldsync_core::types::{TicketId, UserProfile};
use fieldsync_core::{CredentialPair, RefreshToken, Result, TokenStore};

#[derive(Debug, Default)]
struct MemoryState {
    pair: Option<CredentialPair>,
    profile: Option<UserProfile>,
    active_ticket: Option<TicketId>,
}

/// Session storage held in process memory.
///
/// Clones share the same state, so a clone handed to a second component
/// behaves like a second handle on the same durable location. Nothing
/// survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        self.state().pair = Some(pair.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CredentialPair>> {
        Ok(self.state().pair.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.state() = MemoryState::default();
        Ok(())
    }

    async fn clear_if_refresh_token(&self, expected: &RefreshToken) -> Result<bool> {
        let mut state = self.state();
        let matches = state
            .pair
            .as_ref()
            .is_some_and(|pair| &pair.refresh_token == expected);
        if matches {
            *state = MemoryState::default();
        }
        Ok(matches)
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.state().profile = Some(profile.clone());
        Ok(())
    }

    async fn load_profile(&self) -> Result<Option<UserProfile>> {
        Ok(self.state().profile.clone())
    }

    async fn save_active_ticket(&self, ticket: &TicketId) -> Result<()> {
        self.state().active_ticket = Some(ticket.clone());
        Ok(())
    }

    async fn load_active_ticket(&self) -> Result<Option<TicketId>> {
        Ok(self.state().active_ticket.clone())
    }

    async fn remove_active_ticket(&self) -> Result<()> {
        self.state().active_ticket = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::AccessToken;

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();

        let pair = CredentialPair::new(AccessToken::new("A1"), RefreshToken::new("R1"));
        store.save(&pair).await.unwrap();
        store
            .save_active_ticket(&TicketId::new("t-9").unwrap())
            .await
            .unwrap();

        assert_eq!(other.load().await.unwrap(), Some(pair));

        other.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(store.load_active_ticket().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_if_refresh_token_compares_the_stored_token() {
        let store = MemoryStore::new();
        store
            .save(&CredentialPair::new(
                AccessToken::new("A2"),
                RefreshToken::new("R2"),
            ))
            .await
            .unwrap();

        assert!(
            !store
                .clear_if_refresh_token(&RefreshToken::new("R1"))
                .await
                .unwrap()
        );
        assert!(store.load().await.unwrap().is_some());

        assert!(
            store
                .clear_if_refresh_token(&RefreshToken::new("R2"))
                .await
                .unwrap()
        );
        assert!(store.load().await.unwrap().is_none());
    }
}
