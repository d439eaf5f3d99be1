//! Session lifecycle: restore, login, logout.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use fieldsync_core::types::{Ticket, UserProfile};
use fieldsync_core::{AccessToken, CredentialPair, Error, RefreshToken, Result};

use crate::client::{ApiClient, AuthEvent};
use crate::tracking::{LocationTracker, TrackingState};

/// A logged-in user and the bearer token currently in use.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserProfile,
    pub access_token: AccessToken,
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Stored credentials have not been read yet.
    Loading,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }
}

/// Result of [`SessionManager::sync_active_ticket`].
#[derive(Debug, Clone)]
pub struct ActiveTicketSync {
    /// The engineer's active ticket, if the backend reports one.
    pub ticket: Option<Ticket>,
    pub tracking: TrackingState,
}

/// Owns the session state and the single logout path.
///
/// Clones share state. Observers subscribe to [`SessionState`] changes with
/// [`subscribe`](Self::subscribe) instead of polling.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: ApiClient,
    tracker: LocationTracker,
    state: watch::Sender<SessionState>,
    logout: Mutex<()>,
}

impl SessionManager {
    /// Create a manager in the `Loading` state.
    pub fn new(client: ApiClient, tracker: LocationTracker) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            inner: Arc::new(SessionInner {
                client,
                tracker,
                state,
                logout: Mutex::new(()),
            }),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.inner.tracker
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Load the stored session, if a complete one exists.
    ///
    /// Storage failures resolve to `Unauthenticated`.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> SessionState {
        let store = self.inner.client.store();

        let state = match (store.load().await, store.load_profile().await) {
            (Ok(Some(pair)), Ok(Some(user))) => {
                let access_token = pair.access_token.clone();
                self.inner.client.set_credentials(pair);
                info!(user = user.display_name(), "Session restored");
                SessionState::Authenticated(Session { user, access_token })
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to read stored session");
                SessionState::Unauthenticated
            }
            _ => {
                debug!("No stored session");
                SessionState::Unauthenticated
            }
        };

        self.inner.state.send_replace(state.clone());
        state
    }

    /// Install a new session. Storage is written before memory.
    #[instrument(skip_all, fields(user = profile.display_name()))]
    pub async fn login(
        &self,
        profile: UserProfile,
        access_token: AccessToken,
        refresh_token: RefreshToken,
    ) -> Result<()> {
        let pair = CredentialPair::new(access_token.clone(), refresh_token);
        let store = self.inner.client.store();
        store.save(&pair).await?;
        store.save_profile(&profile).await?;

        self.inner.client.set_credentials(pair);
        self.inner
            .state
            .send_replace(SessionState::Authenticated(Session {
                user: profile,
                access_token,
            }));
        info!("Logged in");
        Ok(())
    }

    /// Log in with email and password.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile> {
        let response = self.inner.client.authenticate(email, password).await?;
        let user = response.user;
        self.login(
            user.clone(),
            AccessToken::new(response.token),
            RefreshToken::new(response.refresh_token),
        )
        .await?;
        Ok(user)
    }

    /// End the session.
    ///
    /// Stops tracking, clears in-memory credentials and the store, and goes
    /// `Unauthenticated`. Every step runs even if an earlier one fails; the
    /// first failure is returned. Calling it again is harmless.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.inner.logout.lock().await;
        let mut first_error: Option<Error> = None;

        if let Err(e) = self.inner.tracker.stop().await {
            warn!(error = %e, "Failed to stop location tracking");
            first_error = first_error.or(Some(e));
        }

        self.inner.client.clear_credentials();

        if let Err(e) = self.inner.client.store().clear().await {
            warn!(error = %e, "Failed to clear stored session");
            first_error = first_error.or(Some(e));
        }

        let was = self
            .inner
            .state
            .send_replace(SessionState::Unauthenticated);
        if was.is_authenticated() {
            info!("Logged out");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Follow the API client's refresh outcomes.
    ///
    /// A refreshed token updates the session; a failed refresh logs out. The
    /// task ends when the manager is dropped.
    pub fn watch_auth_events(&self) -> JoinHandle<()> {
        let events = self.inner.client.auth_events();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(follow_auth_events(events, inner))
    }

    /// Reconcile background tracking with the backend's active ticket.
    ///
    /// Tracking is started for an active ticket and stopped otherwise. An
    /// authentication failure logs out before the error is returned.
    #[instrument(skip(self))]
    pub async fn sync_active_ticket(&self) -> Result<ActiveTicketSync> {
        let ticket = match self.inner.client.tickets().active_ticket().await {
            Ok(ticket) => ticket,
            Err(e) => {
                if e.requires_login() {
                    warn!(error = %e, "Session rejected while syncing active ticket");
                    if let Err(logout_err) = self.logout().await {
                        error!(error = %logout_err, "Logout after rejected session failed");
                    }
                }
                return Err(e);
            }
        };

        let tracking = match &ticket {
            Some(ticket) => match self.inner.tracker.start(&ticket.id).await {
                Ok(outcome) => outcome.into(),
                Err(Error::PermissionDenied(denied)) => TrackingState::PermissionDenied(denied),
                Err(e) => return Err(e),
            },
            None => {
                self.inner.tracker.stop().await?;
                TrackingState::Stopped
            }
        };

        debug!(?tracking, active = ticket.is_some(), "Active ticket synced");
        Ok(ActiveTicketSync { ticket, tracking })
    }
}

async fn follow_auth_events(
    mut events: broadcast::Receiver<AuthEvent>,
    inner: Weak<SessionInner>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed auth events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };

        match event {
            AuthEvent::TokensRefreshed(token) => {
                manager.inner.state.send_modify(|state| {
                    if let SessionState::Authenticated(session) = state {
                        session.access_token = token;
                    }
                });
            }
            AuthEvent::RefreshFailed(err) => {
                warn!(error = %err, "Token refresh failed, logging out");
                if let Err(e) = manager.logout().await {
                    error!(error = %e, "Logout after failed refresh failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
