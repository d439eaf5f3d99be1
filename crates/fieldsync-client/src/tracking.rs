//! Background location tracking.
//!
//! Two halves share nothing but durable storage and the host scheduler:
//!
//! - [`LocationTracker`] runs in the foreground session. It asks for
//!   permission, writes the active-ticket marker and registers the task.
//! - [`LocationReporter`] runs on every scheduler invocation, possibly in a
//!   fresh process. It rebuilds its credentials from storage, confirms the
//!   marker's ticket is still active and submits the latest sample.
//!
//! What an invocation does with the marker is decided by [`plan`], a pure
//! function of the stored marker and what the backend said.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use fieldsync_core::error::{Error, PermissionError};
use fieldsync_core::types::{LocationSample, Ticket, TicketId};
use fieldsync_core::{LocationPermissions, Result, TaskScheduler, TokenStore, TrackingOptions};

use crate::client::ApiClient;
use crate::config::ClientConfig;

// ============================================================================
// Decision
// ============================================================================

/// What the backend said about the engineer's active ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendView {
    /// This ticket is the engineer's active ticket.
    Active(TicketId),
    /// The engineer has no active ticket.
    NoActiveTicket,
    /// The ticket is not found or no longer accessible (404/403).
    Gone,
    /// The session is over: no credentials, or the refresh protocol gave up.
    SessionEnded,
    /// The backend could not be asked (network failure, 5xx).
    Unreachable,
}

impl BackendView {
    pub fn from_active(ticket: Option<&Ticket>) -> Self {
        match ticket {
            Some(ticket) => BackendView::Active(ticket.id.clone()),
            None => BackendView::NoActiveTicket,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        if err.indicates_gone() {
            BackendView::Gone
        } else if err.requires_login() {
            BackendView::SessionEnded
        } else {
            BackendView::Unreachable
        }
    }
}

/// What an invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAction {
    /// Submit the latest sample.
    Report,
    /// Stop tracking: unregister the task.
    Deregister,
    /// Do nothing this time; the task stays registered.
    Skip,
}

/// What should happen to the stored marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Keep,
    Delete,
}

/// Decide what to do given the stored marker and the backend's view.
///
/// A marker that no longer names the engineer's active ticket is deleted and
/// the task deregistered. Transient failures leave everything in place.
pub fn plan(marker: Option<&TicketId>, view: &BackendView) -> (ReportAction, MarkerState) {
    let Some(marker) = marker else {
        return (ReportAction::Skip, MarkerState::Keep);
    };

    match view {
        BackendView::Active(active) if active == marker => {
            (ReportAction::Report, MarkerState::Keep)
        }
        BackendView::Active(_)
        | BackendView::NoActiveTicket
        | BackendView::Gone
        | BackendView::SessionEnded => (ReportAction::Deregister, MarkerState::Delete),
        BackendView::Unreachable => (ReportAction::Skip, MarkerState::Keep),
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Result of one scheduler invocation.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    /// No marker was stored; nothing to do.
    NoMarker,
    /// The latest sample was submitted.
    Reported { ticket: TicketId },
    /// Tracking was stopped: marker deleted and task unregistered.
    Deregistered { ticket: TicketId },
    /// The ticket is still active but the host delivered no sample.
    NoSample { ticket: TicketId },
    /// A transient failure; the task stays registered.
    Skipped { ticket: TicketId, reason: Error },
    /// The marker could not be read.
    Failed(Error),
}

/// The background location task body.
#[derive(Clone)]
pub struct LocationReporter {
    client: ApiClient,
    scheduler: Arc<dyn TaskScheduler>,
}

impl LocationReporter {
    pub fn new(client: ApiClient, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self { client, scheduler }
    }

    /// Build a reporter with its own API client over `store`.
    ///
    /// Credentials are loaded from `store` on every invocation, never shared
    /// with a foreground session.
    pub fn from_storage(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Result<Self> {
        Ok(Self::new(ApiClient::new(config, store)?, scheduler))
    }

    /// Run one invocation with the samples the host delivered.
    ///
    /// Never fails; every error is logged and folded into the outcome.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn invoke(&self, samples: &[LocationSample]) -> InvocationOutcome {
        let store = self.client.store();

        let marker = match store.load_active_ticket().await {
            Ok(Some(marker)) => marker,
            Ok(None) => {
                debug!("No active-ticket marker");
                return InvocationOutcome::NoMarker;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read active-ticket marker");
                return InvocationOutcome::Failed(e);
            }
        };

        match self.client.prime_from_store().await {
            Ok(true) => {}
            Ok(false) => {
                self.client.clear_credentials();
                info!(ticket = %marker, "No stored session, stopping tracking");
                let view = BackendView::SessionEnded;
                let (_, marker_state) = plan(Some(&marker), &view);
                return self.deregister(marker, marker_state, &view).await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load stored session");
                return InvocationOutcome::Skipped {
                    ticket: marker,
                    reason: e,
                };
            }
        }

        let view = match self.client.tickets().active_ticket().await {
            Ok(active) => BackendView::from_active(active.as_ref()),
            Err(e) => {
                warn!(error = %e, "Failed to fetch active ticket");
                let view = BackendView::from_error(&e);
                if view == BackendView::Unreachable {
                    return InvocationOutcome::Skipped {
                        ticket: marker,
                        reason: e,
                    };
                }
                view
            }
        };

        if let (ReportAction::Deregister, marker_state) = plan(Some(&marker), &view) {
            return self.deregister(marker, marker_state, &view).await;
        }

        let Some(sample) = LocationSample::latest(samples) else {
            debug!(ticket = %marker, "No location sample delivered");
            return InvocationOutcome::NoSample { ticket: marker };
        };

        match self.client.tickets().post_location(&marker, sample).await {
            Ok(()) => {
                debug!(ticket = %marker, "Location reported");
                InvocationOutcome::Reported { ticket: marker }
            }
            Err(e) => {
                warn!(ticket = %marker, error = %e, "Failed to report location");
                let view = BackendView::from_error(&e);
                match plan(Some(&marker), &view) {
                    (ReportAction::Deregister, marker_state) => {
                        self.deregister(marker, marker_state, &view).await
                    }
                    _ => InvocationOutcome::Skipped {
                        ticket: marker,
                        reason: e,
                    },
                }
            }
        }
    }

    async fn deregister(
        &self,
        marker: TicketId,
        marker_state: MarkerState,
        view: &BackendView,
    ) -> InvocationOutcome {
        if marker_state == MarkerState::Delete {
            if let Err(e) = self.client.store().remove_active_ticket().await {
                warn!(error = %e, "Failed to delete active-ticket marker");
            }
        }
        if let Err(e) = self.scheduler.unregister().await {
            warn!(error = %e, "Failed to unregister location task");
        }

        info!(ticket = %marker, ?view, "Ticket no longer active, tracking stopped");
        InvocationOutcome::Deregistered { ticket: marker }
    }
}

impl std::fmt::Debug for LocationReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationReporter")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Result of [`LocationTracker::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Permissions were granted and the task registered.
    Started,
    /// The task was already registered; only the marker was updated.
    AlreadyTracking,
}

/// Tracking status after an active-ticket sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Started,
    AlreadyTracking,
    Stopped,
    PermissionDenied(PermissionError),
}

impl From<StartOutcome> for TrackingState {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started => TrackingState::Started,
            StartOutcome::AlreadyTracking => TrackingState::AlreadyTracking,
        }
    }
}

/// Arms and disarms the background location task.
#[derive(Clone)]
pub struct LocationTracker {
    store: Arc<dyn TokenStore>,
    scheduler: Arc<dyn TaskScheduler>,
    permissions: Arc<dyn LocationPermissions>,
    options: TrackingOptions,
}

impl LocationTracker {
    pub fn new(
        store: Arc<dyn TokenStore>,
        scheduler: Arc<dyn TaskScheduler>,
        permissions: Arc<dyn LocationPermissions>,
    ) -> Self {
        Self {
            store,
            scheduler,
            permissions,
            options: TrackingOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TrackingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TrackingOptions {
        &self.options
    }

    /// Start tracking `ticket`.
    ///
    /// Requires foreground then background permission; on denial nothing is
    /// written or registered.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn start(&self, ticket: &TicketId) -> Result<StartOutcome> {
        if self.scheduler.is_registered().await? {
            self.store.save_active_ticket(ticket).await?;
            debug!("Location task already registered");
            return Ok(StartOutcome::AlreadyTracking);
        }

        if !self.permissions.request_foreground().await?.is_granted() {
            warn!("Foreground location permission denied");
            return Err(PermissionError::Foreground.into());
        }
        if !self.permissions.request_background().await?.is_granted() {
            warn!("Background location permission denied");
            return Err(PermissionError::Background.into());
        }

        self.store.save_active_ticket(ticket).await?;
        self.scheduler.register(&self.options).await?;
        info!("Location tracking started");
        Ok(StartOutcome::Started)
    }

    /// Stop tracking. The marker is removed even if nothing was registered.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        if self.scheduler.is_registered().await? {
            self.scheduler.unregister().await?;
            info!("Location tracking stopped");
        }
        self.store.remove_active_ticket().await
    }

    pub async fn is_tracking(&self) -> Result<bool> {
        self.scheduler.is_registered().await
    }
}

impl std::fmt::Debug for LocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationTracker")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
