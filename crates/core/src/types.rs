//! Shared identifier and value types.

use serde::{Deserialize, Serialize};

/// Server-side booking identifiers are opaque strings (`_id` on the wire).
pub type BookingId = String;

/// Server-side worker identifiers are opaque strings.
pub type WorkerId = String;

/// Server-side user identifiers are opaque strings.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A single position fix from a device location provider or simulator.
///
/// Immutable once created; superseded wholesale by the next sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Milliseconds since the Unix epoch, as reported by the provider.
    pub timestamp_ms: i64,
}

impl LocationSample {
    /// Create a sample with no accuracy estimate.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp_ms,
        }
    }
}
