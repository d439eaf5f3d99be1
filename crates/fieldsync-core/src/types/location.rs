//! Location samples delivered by the platform's location service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    /// A fix with only coordinates, stamped with the current time.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            speed: None,
            heading: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Returns the most recent sample of a batch.
    pub fn latest(samples: &[LocationSample]) -> Option<&LocationSample> {
        samples.iter().max_by_key(|s| s.recorded_at)
    }
}
