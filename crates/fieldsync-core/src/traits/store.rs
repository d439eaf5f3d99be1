//! Durable session storage trait.

use async_trait::async_trait;

use crate::types::{TicketId, UserProfile};
use crate::{CredentialPair, RefreshToken, Result};

/// Durable storage for the session.
///
/// Implementations keep two backends apart: a secure one for the credential
/// pair (`token`, `refreshToken`) and a general one for the user profile
/// (`user`) and the active-ticket marker (`activeTicketId`).
///
/// A value written by a `save_*` call must be returned by the matching `load_*`
/// call afterwards, including from a new store instance opened on the same
/// backing location. After [`clear`](TokenStore::clear) every `load_*` returns
/// `None`; no caller may observe a partially cleared store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the credential pair, replacing any previous one.
    async fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Load the credential pair. A store holding only one half returns `None`.
    async fn load(&self) -> Result<Option<CredentialPair>>;

    /// Remove all four keys.
    async fn clear(&self) -> Result<()>;

    /// Remove all four keys, but only while the stored refresh token is still
    /// `expected`. Returns whether the store was cleared.
    ///
    /// The comparison and the removal happen atomically with respect to other
    /// handles on the same location, so a pair rotated in by another process
    /// between a failed refresh and the clean-up survives.
    async fn clear_if_refresh_token(&self, expected: &RefreshToken) -> Result<bool>;

    /// Persist the logged-in user's profile.
    async fn save_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Load the logged-in user's profile.
    async fn load_profile(&self) -> Result<Option<UserProfile>>;

    /// Record the ticket the background reporter should track.
    async fn save_active_ticket(&self, ticket: &TicketId) -> Result<()>;

    /// Load the active-ticket marker.
    async fn load_active_ticket(&self) -> Result<Option<TicketId>>;

    /// Delete the active-ticket marker. Deleting a missing marker is not an error.
    async fn remove_active_ticket(&self) -> Result<()>;
}
