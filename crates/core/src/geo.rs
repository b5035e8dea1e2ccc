//! Shared great-circle distance and ETA math.
//!
//! Every distance the engine computes (route fallbacks, live-tracking
//! distance, ETA estimation) goes through [`haversine_km`]. Keeping a
//! single implementation is a hard requirement: the same formula is
//! consumed from three call sites and must not drift.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Fixed ETA heuristic: two minutes of travel per kilometre.
const ETA_MINUTES_PER_KM: f64 = 2.0;

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Great-circle distance between two `(lat, lon)` pairs in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_km(lat1, lon1, lat2, lon2) * 1000.0
}

// ---------------------------------------------------------------------------
// ETA
// ---------------------------------------------------------------------------

/// Distance-based ETA estimate: `ceil(km * 2)` minutes.
///
/// Used whenever no provider route exists yet, and by screens configured
/// to prefer the heuristic over provider durations.
pub fn eta_minutes_from_km(distance_km: f64) -> u32 {
    (distance_km * ETA_MINUTES_PER_KM).ceil().max(0.0) as u32
}

/// Which ETA source wins when both a provider duration and a distance
/// are available.
///
/// The two are used inconsistently in the product today; rather than pick
/// a winner the precedence is a per-screen configuration knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EtaPrecedence {
    /// Trust the provider's traffic-aware duration when present.
    #[default]
    ProviderDuration,
    /// Always use the 2 min/km heuristic, even when a route exists.
    DistanceHeuristic,
}

/// Resolve an ETA in minutes from the configured precedence.
///
/// Falls back to the distance heuristic whenever the provider duration is
/// absent, regardless of precedence.
pub fn eta_minutes(
    precedence: EtaPrecedence,
    provider_duration_secs: Option<u32>,
    distance_km: f64,
) -> u32 {
    match (precedence, provider_duration_secs) {
        (EtaPrecedence::ProviderDuration, Some(secs)) => (f64::from(secs) / 60.0).ceil() as u32,
        _ => eta_minutes_from_km(distance_km),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
