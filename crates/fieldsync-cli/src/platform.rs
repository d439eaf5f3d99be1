//! Host platform pieces for a desktop CLI.
//!
//! There is no OS-level background location service here, so the location
//! task registration is a small JSON file that an external scheduler (cron,
//! a systemd timer) checks before running `fieldsync report-location`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fieldsync_core::error::{Error, StorageError};
use fieldsync_core::{LocationPermissions, PermissionStatus, Result, TaskScheduler, TrackingOptions};

fn map_io(err: std::io::Error) -> Error {
    Error::Storage(StorageError::from(err))
}

/// The persisted task registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRegistration {
    pub registered_at: DateTime<Utc>,
    pub interval_secs: u64,
    pub distance_interval_m: f64,
    pub notification_title: String,
}

/// Task scheduler backed by a registration file.
#[derive(Debug, Clone)]
pub struct FileScheduler {
    path: PathBuf,
}

impl FileScheduler {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the current registration, if any.
    pub async fn registration(&self) -> Result<Option<TaskRegistration>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(map_io(e)),
        };

        serde_json::from_str(&json).map(Some).map_err(|e| {
            StorageError::Corrupt {
                key: "tracking".to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl TaskScheduler for FileScheduler {
    async fn is_registered(&self) -> Result<bool> {
        tokio::fs::try_exists(&self.path).await.map_err(map_io)
    }

    async fn register(&self, options: &TrackingOptions) -> Result<()> {
        let registration = TaskRegistration {
            registered_at: Utc::now(),
            interval_secs: options.time_interval.as_secs(),
            distance_interval_m: options.distance_interval_m,
            notification_title: options.notification_title.clone(),
        };
        let json = serde_json::to_string_pretty(&registration).map_err(|e| {
            Error::Storage(StorageError::Io {
                message: e.to_string(),
            })
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(map_io)?;
        }
        tokio::fs::write(&self.path, json).await.map_err(map_io)?;
        debug!(path = %self.path.display(), "Location task registered");
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Location task unregistered");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(e)),
        }
    }
}

/// Permission answers for a terminal session.
///
/// Foreground access is implied by running the command. Background access
/// has to be granted explicitly with `--allow-background-location`.
#[derive(Debug, Clone, Copy)]
pub struct CliPermissions {
    allow_background: bool,
}

impl CliPermissions {
    pub fn new(allow_background: bool) -> Self {
        Self { allow_background }
    }
}

#[async_trait]
impl LocationPermissions for CliPermissions {
    async fn request_foreground(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn request_background(&self) -> Result<PermissionStatus> {
        Ok(if self.allow_background {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = FileScheduler::new(dir.path().join("tracking.json"));

        assert!(!scheduler.is_registered().await.unwrap());
        assert!(scheduler.registration().await.unwrap().is_none());

        scheduler.register(&TrackingOptions::default()).await.unwrap();
        assert!(scheduler.is_registered().await.unwrap());

        let registration = scheduler.registration().await.unwrap().unwrap();
        assert_eq!(registration.interval_secs, 300);
        assert_eq!(registration.notification_title, "FieldSync is Active");

        scheduler.unregister().await.unwrap();
        assert!(!scheduler.is_registered().await.unwrap());

        // Unregistering twice is fine.
        scheduler.unregister().await.unwrap();
    }

    #[tokio::test]
    async fn background_permission_follows_flag() {
        let denied = CliPermissions::new(false);
        assert!(denied.request_foreground().await.unwrap().is_granted());
        assert!(!denied.request_background().await.unwrap().is_granted());

        let granted = CliPermissions::new(true);
        assert!(granted.request_background().await.unwrap().is_granted());
    }
}
