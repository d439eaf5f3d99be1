//! Single-flight coordination for token refresh.
//!
//! The coordinator is a two-state machine, `Idle` and `Refreshing`. The first
//! caller to [`begin`](RefreshCoordinator::begin) while idle gets a
//! [`RefreshLease`] and performs the refresh; every caller that arrives while
//! the lease is held gets a [`Waiter`] and is queued. Completing the lease
//! hands the same outcome to every queued waiter in arrival order and returns
//! the machine to `Idle`.
//!
//! Dropping a lease without completing it (the refreshing future was
//! cancelled) still returns the machine to `Idle` and rejects the queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use fieldsync_core::error::{AuthError, Error, NetworkError};
use fieldsync_core::{AccessToken, Result};

type Outcome = Result<AccessToken>;

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Refreshing { waiters: VecDeque<Queued> },
}

#[derive(Debug)]
struct Queued {
    position: usize,
    tx: oneshot::Sender<Outcome>,
}

/// Coordinates refreshes so that at most one is in flight.
#[derive(Debug, Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<State>,
    /// Positions in the order their outcome was sent.
    #[cfg(test)]
    released: Mutex<Vec<usize>>,
}

/// The caller's role in the current refresh.
pub(crate) enum Turn<'a> {
    /// Perform the refresh and complete the lease.
    Lead(RefreshLease<'a>),
    /// Wait for the leader's outcome.
    Wait(Waiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the refresh protocol: lead a new refresh or queue behind the
    /// one in flight.
    pub fn begin(&self) -> Turn<'_> {
        let mut state = self.state();
        match &mut *state {
            State::Idle => {
                *state = State::Refreshing {
                    waiters: VecDeque::new(),
                };
                Turn::Lead(RefreshLease {
                    coordinator: self,
                    completed: false,
                })
            }
            State::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                let position = waiters.len();
                waiters.push_back(Queued { position, tx });
                Turn::Wait(Waiter { position, rx })
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state(), State::Refreshing { .. })
    }

    /// Number of callers queued behind the refresh in flight.
    pub fn queued(&self) -> usize {
        match &*self.state() {
            State::Idle => 0,
            State::Refreshing { waiters } => waiters.len(),
        }
    }

    fn finish(&self, outcome: Outcome) -> usize {
        let waiters = match std::mem::take(&mut *self.state()) {
            State::Refreshing { waiters } => waiters,
            State::Idle => VecDeque::new(),
        };

        let count = waiters.len();
        for waiter in waiters {
            #[cfg(test)]
            self.released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(waiter.position);
            if waiter.tx.send(outcome.clone()).is_err() {
                debug!(position = waiter.position, "Waiter dropped before the refresh finished");
            }
        }
        count
    }
}

fn abandoned() -> Error {
    AuthError::RefreshFailed(Box::new(
        NetworkError::Other {
            message: "token refresh was abandoned".to_string(),
        }
        .into(),
    ))
    .into()
}

/// Exclusive right to perform the refresh in flight.
pub(crate) struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    completed: bool,
}

impl RefreshLease<'_> {
    /// Publish the outcome to every queued waiter and return to `Idle`.
    ///
    /// Returns the number of waiters that were resolved.
    pub fn complete(mut self, outcome: Outcome) -> usize {
        self.completed = true;
        self.coordinator.finish(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.coordinator.finish(Err(abandoned()));
        }
    }
}

/// A caller queued behind the refresh in flight.
pub(crate) struct Waiter {
    position: usize,
    rx: oneshot::Receiver<Outcome>,
}

impl Waiter {
    /// Zero-based place in the queue.
    pub fn position(&self) -> usize {
        self.position
    }

    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or_else(|_| Err(abandoned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::error::HttpError;

    fn lead(coordinator: &RefreshCoordinator) -> RefreshLease<'_> {
        match coordinator.begin() {
            Turn::Lead(lease) => lease,
            Turn::Wait(_) => panic!("expected to lead"),
        }
    }

    fn wait(coordinator: &RefreshCoordinator) -> Waiter {
        match coordinator.begin() {
            Turn::Lead(_) => panic!("expected to wait"),
            Turn::Wait(waiter) => waiter,
        }
    }

    #[tokio::test]
    async fn only_first_caller_leads() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator);
        assert!(coordinator.is_refreshing());

        let waiters: Vec<_> = (0..5).map(|_| wait(&coordinator)).collect();
        assert_eq!(coordinator.queued(), 5);

        assert_eq!(lease.complete(Ok(AccessToken::new("A2"))), 5);
        assert!(!coordinator.is_refreshing());

        for waiter in waiters {
            assert_eq!(waiter.wait().await.unwrap(), AccessToken::new("A2"));
        }
    }

    #[tokio::test]
    async fn failure_is_shared_by_every_waiter() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator);
        let first = wait(&coordinator);
        let second = wait(&coordinator);

        let cause: Error = HttpError::new(403, Some("refresh token revoked".to_string())).into();
        lease.complete(Err(AuthError::RefreshFailed(Box::new(cause)).into()));

        for waiter in [first, second] {
            let err = waiter.wait().await.unwrap_err();
            assert!(err.to_string().contains("refresh token revoked"));
        }
    }

    #[tokio::test]
    async fn waiters_resolve_in_arrival_order() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator);

        let waiters: Vec<_> = (0..4).map(|_| wait(&coordinator)).collect();
        let positions: Vec<_> = waiters.iter().map(Waiter::position).collect();
        assert_eq!(positions, [0, 1, 2, 3]);

        lease.complete(Ok(AccessToken::new("A2")));

        assert_eq!(*coordinator.released.lock().unwrap(), [0, 1, 2, 3]);
        for waiter in waiters {
            assert_eq!(waiter.wait().await.unwrap(), AccessToken::new("A2"));
        }
    }

    #[tokio::test]
    async fn dropped_lease_rejects_queue_and_resets() {
        let coordinator = RefreshCoordinator::new();
        let lease = lead(&coordinator);
        let waiter = wait(&coordinator);

        drop(lease);

        assert!(!coordinator.is_refreshing());
        assert!(waiter.wait().await.is_err());

        // The next 401 starts a fresh refresh.
        let _lease = lead(&coordinator);
    }

    #[test]
    fn new_refresh_after_completion() {
        let coordinator = RefreshCoordinator::new();
        lead(&coordinator).complete(Ok(AccessToken::new("A2")));
        assert_eq!(lead(&coordinator).complete(Ok(AccessToken::new("A3"))), 0);
    }
}
