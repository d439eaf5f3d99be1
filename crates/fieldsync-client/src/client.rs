//! The API client: one HTTP pipeline with transparent token refresh.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

use fieldsync_core::error::{AuthError, Error};
use fieldsync_core::{AccessToken, BaseUrl, CredentialPair, RefreshToken, Result, TokenStore};

use crate::config::ClientConfig;
use crate::endpoints::{
    self, ENGINEER_ROLE, LoginRequest, LoginResponse, RefreshTokenRequest, RefreshTokenResponse,
};
use crate::http::{ApiRequest, HttpTransport, decode};
use crate::refresh::{RefreshCoordinator, Turn};
use crate::tickets::TicketsApi;

const AUTH_EVENT_CAPACITY: usize = 16;

/// Notifications about credential changes made by the refresh protocol.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// A refresh succeeded; the new pair is in memory and in the store.
    TokensRefreshed(AccessToken),
    /// A refresh failed; memory and the store have been cleared.
    RefreshFailed(Error),
}

/// Client for the FieldSync backend.
///
/// Every request goes through one pipeline that stamps the current bearer
/// token. A 401 triggers the refresh-token protocol: one refresh in flight,
/// every other 401 queued behind it, each request retried at most once.
///
/// Clones share the same credentials and refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: HttpTransport,
    store: Arc<dyn TokenStore>,
    access_token: watch::Sender<Option<AccessToken>>,
    refresh_token: RwLock<Option<RefreshToken>>,
    coordinator: RefreshCoordinator,
    events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    /// Create a client with no credentials.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let (access_token, _) = watch::channel(None);
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                store,
                access_token,
                refresh_token: RwLock::new(None),
                coordinator: RefreshCoordinator::new(),
                events,
            }),
        })
    }

    /// Returns the backend this client talks to.
    pub fn base_url(&self) -> &BaseUrl {
        self.inner.transport.base()
    }

    /// Returns the durable store the refresh protocol writes to.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// Ticket endpoints.
    pub fn tickets(&self) -> TicketsApi<'_> {
        TicketsApi::new(self)
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    /// Returns the bearer token currently stamped on requests.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.access_token.borrow().clone()
    }

    /// Returns the refresh token held in memory.
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.inner
            .refresh_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the bearer token. Observers of [`subscribe_token`](Self::subscribe_token)
    /// see the change.
    pub fn set_auth_token(&self, token: Option<AccessToken>) {
        self.inner.access_token.send_replace(token);
    }

    /// Replace the refresh token held in memory.
    pub fn set_refresh_token(&self, token: Option<RefreshToken>) {
        *self
            .inner
            .refresh_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Install both halves of a credential pair.
    pub fn set_credentials(&self, pair: CredentialPair) {
        self.set_refresh_token(Some(pair.refresh_token));
        self.set_auth_token(Some(pair.access_token));
    }

    /// Drop both tokens from memory. The store is left untouched.
    pub fn clear_credentials(&self) {
        self.set_refresh_token(None);
        self.set_auth_token(None);
    }

    /// Load the credential pair from the store into memory.
    ///
    /// Returns false, leaving memory untouched, if the store holds no pair.
    pub async fn prime_from_store(&self) -> Result<bool> {
        match self.inner.store.load().await? {
            Some(pair) => {
                self.set_credentials(pair);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Watch the bearer token.
    pub fn subscribe_token(&self) -> watch::Receiver<Option<AccessToken>> {
        self.inner.access_token.subscribe()
    }

    /// Receive refresh outcomes.
    pub fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Exchange email and password for a credential pair.
    ///
    /// Login bypasses the refresh protocol: a 401 here means bad credentials.
    /// The returned tokens are not installed; pass them to
    /// [`SessionManager::login`](crate::SessionManager::login).
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResponse> {
        info!("Logging in");
        let request = ApiRequest::new(Method::POST, endpoints::LOGIN).with_json(&LoginRequest {
            email,
            password,
            role: ENGINEER_ROLE,
        })?;

        let response = self.inner.transport.send(&request, None).await?;
        decode(response).await
    }

    /// GET a path and decode the response.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self.execute(ApiRequest::new(Method::GET, path)).await?;
        decode(response).await
    }

    /// POST a JSON body and decode the response.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest::new(Method::POST, path).with_json(body)?;
        decode(self.execute(request).await?).await
    }

    /// PUT a JSON body and decode the response.
    pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = ApiRequest::new(Method::PUT, path).with_json(body)?;
        decode(self.execute(request).await?).await
    }

    /// Send a request through the authenticated pipeline.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let sent = self.access_token();
        match self.inner.transport.send(&request, sent.as_ref()).await {
            Err(err) if err.is_unauthorized() => {}
            other => return other,
        }

        let token = match self.replacement_token(sent.as_ref()).await {
            Some(token) => token,
            None => self.refresh_tokens(sent.as_ref()).await?,
        };

        match self.inner.transport.send(&request, Some(&token)).await {
            Err(err) if err.is_unauthorized() => {
                warn!("Request still unauthorized after refresh");
                Err(AuthError::AuthExpired.into())
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------------
    // Refresh protocol
    // ------------------------------------------------------------------------

    /// Returns a token newer than `sent`, if memory or the store already has one.
    ///
    /// Another handle on the same store may have rotated the pair. The backend
    /// only honors the newest refresh token.
    async fn replacement_token(&self, sent: Option<&AccessToken>) -> Option<AccessToken> {
        if let Some(current) = self.access_token()
            && Some(&current) != sent
        {
            debug!("Token was replaced while the request was in flight");
            return Some(current);
        }

        match self.inner.store.load().await {
            Ok(Some(pair)) if Some(&pair.access_token) != sent => {
                info!("Adopting credentials rotated by another client");
                Some(self.adopt(pair))
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credentials, refreshing");
                None
            }
        }
    }

    /// Install a pair and announce it as refreshed.
    fn adopt(&self, pair: CredentialPair) -> AccessToken {
        let access_token = pair.access_token.clone();
        self.set_credentials(pair);
        let _ = self
            .inner
            .events
            .send(AuthEvent::TokensRefreshed(access_token.clone()));
        access_token
    }

    /// Obtain a fresh access token, joining the refresh in flight if there is one.
    async fn refresh_tokens(&self, sent: Option<&AccessToken>) -> Result<AccessToken> {
        match self.inner.coordinator.begin() {
            Turn::Wait(waiter) => {
                debug!(position = waiter.position(), "Waiting for refresh in flight");
                waiter.wait().await
            }
            Turn::Lead(lease) => {
                // A refresh that finished after our check already replaced `sent`.
                let outcome = match self.access_token() {
                    Some(current) if Some(&current) != sent => Ok(current),
                    _ => self.perform_refresh().await,
                };
                let released = lease.complete(outcome.clone());
                debug!(released, "Refresh complete");
                outcome
            }
        }
    }

    /// Call the refresh endpoint and apply the outcome to memory and the store.
    ///
    /// Credentials are updated before the caller releases the queue, so a
    /// waiter never retries with a token the client has already dropped.
    #[instrument(skip(self))]
    async fn perform_refresh(&self) -> Result<AccessToken> {
        info!("Refreshing access token");
        let presented = self.refresh_token();

        match self.request_new_pair(presented.as_ref()).await {
            Ok(pair) => {
                if let Err(e) = self.inner.store.save(&pair).await {
                    warn!(error = %e, "Failed to persist refreshed credentials");
                }
                let access_token = self.adopt(pair);
                info!("Access token refreshed");
                Ok(access_token)
            }
            Err(cause) => self.settle_failed_refresh(presented.as_ref(), cause).await,
        }
    }

    /// End the session after a failed refresh, unless the store meanwhile
    /// received a pair that no longer contains the rejected refresh token.
    async fn settle_failed_refresh(
        &self,
        rejected: Option<&RefreshToken>,
        cause: Error,
    ) -> Result<AccessToken> {
        let cleared = match rejected {
            Some(rejected) => self.inner.store.clear_if_refresh_token(rejected).await,
            None => self.inner.store.clear().await.map(|()| true),
        };

        match cleared {
            Ok(true) => {}
            Ok(false) => match self.inner.store.load().await {
                Ok(Some(pair)) => {
                    info!(error = %cause, "Refresh rejected, adopting credentials rotated by another client");
                    return Ok(self.adopt(pair));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to read stored credentials"),
            },
            Err(e) => warn!(error = %e, "Failed to clear stored credentials"),
        }

        error!(error = %cause, "Token refresh failed, clearing credentials");
        let err: Error = AuthError::RefreshFailed(Box::new(cause)).into();
        self.clear_credentials();
        let _ = self.inner.events.send(AuthEvent::RefreshFailed(err.clone()));
        Err(err)
    }

    async fn request_new_pair(&self, refresh_token: Option<&RefreshToken>) -> Result<CredentialPair> {
        let refresh_token = refresh_token.ok_or(AuthError::NotAuthenticated)?;
        let request = ApiRequest::new(Method::POST, endpoints::REFRESH_TOKEN).with_json(
            &RefreshTokenRequest {
                refresh_token: refresh_token.as_str(),
            },
        )?;

        let response = self.inner.transport.send(&request, None).await?;
        let body: RefreshTokenResponse = decode(response).await?;

        Ok(CredentialPair::new(
            AccessToken::new(body.access_token),
            RefreshToken::new(body.refresh_token),
        ))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", self.base_url())
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}
