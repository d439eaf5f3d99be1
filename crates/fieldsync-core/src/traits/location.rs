//! Background location task traits.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Scheduling parameters for the background location task.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingOptions {
    /// Target interval between invocations.
    pub time_interval: Duration,
    /// Minimum displacement in meters that also triggers an invocation.
    pub distance_interval_m: f64,
    /// Title of the persistent notification shown while tracking.
    pub notification_title: String,
    /// Body of the persistent notification shown while tracking.
    pub notification_body: String,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            time_interval: Duration::from_secs(5 * 60),
            distance_interval_m: 200.0,
            notification_title: "FieldSync is Active".to_string(),
            notification_body: "Tracking your location for the active ticket.".to_string(),
        }
    }
}

/// The host's background task scheduler.
///
/// Registration is durable on the host side: a registered task keeps being
/// invoked until it is unregistered, whether or not a foreground session exists.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Returns true if the location task is currently registered.
    async fn is_registered(&self) -> Result<bool>;

    /// Register the location task with the given options.
    async fn register(&self, options: &TrackingOptions) -> Result<()>;

    /// Unregister the location task. Unregistering a missing task is not an error.
    async fn unregister(&self) -> Result<()>;
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// The host's location permission prompts.
#[async_trait]
pub trait LocationPermissions: Send + Sync {
    /// Request permission to read location while the app is in use.
    async fn request_foreground(&self) -> Result<PermissionStatus>;

    /// Request permission to read location from the background task.
    async fn request_background(&self) -> Result<PermissionStatus>;
}
