//! Directions provider abstraction and its HTTP implementation.
//!
//! The engine asks a provider for a traffic-aware route between two
//! points and receives polyline geometry plus distance and duration.
//! [`MapboxDirections`] talks to a Mapbox-style Directions API; the
//! [`DirectionsProvider`] trait keeps the engine testable and leaves
//! room for a different provider per deployment.

use async_trait::async_trait;
use serde::Deserialize;

/// Routing profiles the provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingProfile {
    Driving,
    /// Driving with live traffic. The default for worker tracking.
    DrivingTraffic,
    Walking,
    Cycling,
}

impl RoutingProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Driving => "driving",
            Self::DrivingTraffic => "driving-traffic",
            Self::Walking => "walking",
            Self::Cycling => "cycling",
        }
    }
}

/// One computed route. Replaced wholesale on every recomputation.
#[derive(Debug, Clone)]
pub struct RouteResult {
    /// Ordered `(lat, lon)` points of the route line.
    pub coordinates: Vec<(f64, f64)>,
    pub distance_m: f64,
    pub duration_secs: f64,
    /// Raw GeoJSON geometry, when the provider supplied one.
    pub geometry: Option<serde_json::Value>,
}

/// Errors from the directions layer.
#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Directions API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response that carried no usable route geometry.
    #[error("Provider returned no usable route")]
    EmptyRoute,
}

/// A routing backend that can resolve a route between two points.
///
/// Coordinates are `(longitude, latitude)` pairs, matching the order
/// the GeoJSON ecosystem uses on the wire.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn get_directions(
        &self,
        origin_lng_lat: (f64, f64),
        dest_lng_lat: (f64, f64),
        profile: RoutingProfile,
    ) -> Result<RouteResult, DirectionsError>;
}

// ---------------------------------------------------------------------------
// Mapbox implementation
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";

/// Directions client for the Mapbox HTTP API.
pub struct MapboxDirections {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    distance: f64,
    duration: f64,
    geometry: serde_json::Value,
}

impl MapboxDirections {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, access_token)
    }

    pub fn with_base_url(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Build a client from `MAPBOX_ACCESS_TOKEN` (and an optional
    /// `MAPBOX_BASE_URL` override). Returns `None` when no token is set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("MAPBOX_ACCESS_TOKEN").ok()?;
        let base_url =
            std::env::var("MAPBOX_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Some(Self::with_base_url(base_url, token))
    }
}

#[async_trait]
impl DirectionsProvider for MapboxDirections {
    async fn get_directions(
        &self,
        origin_lng_lat: (f64, f64),
        dest_lng_lat: (f64, f64),
        profile: RoutingProfile,
    ) -> Result<RouteResult, DirectionsError> {
        let url = format!(
            "{}/directions/v5/mapbox/{}/{},{};{},{}",
            self.base_url,
            profile.as_str(),
            origin_lng_lat.0,
            origin_lng_lat.1,
            dest_lng_lat.0,
            dest_lng_lat.1,
        );

        let response = self
            .client
            .get(url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DirectionsError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DirectionsResponse = response.json().await?;
        let route = parsed.routes.into_iter().next().ok_or(DirectionsError::EmptyRoute)?;
        let coordinates = linestring_coordinates(&route.geometry)?;

        Ok(RouteResult {
            coordinates,
            distance_m: route.distance,
            duration_secs: route.duration,
            geometry: Some(route.geometry),
        })
    }
}

/// Extract `(lat, lon)` pairs from a GeoJSON `LineString` geometry.
///
/// GeoJSON stores positions as `[lon, lat]`; the UI layer works in
/// `(lat, lon)`, so the axes are swapped here, exactly once.
fn linestring_coordinates(geometry: &serde_json::Value) -> Result<Vec<(f64, f64)>, DirectionsError> {
    let positions = geometry
        .get("coordinates")
        .and_then(|c| c.as_array())
        .ok_or(DirectionsError::EmptyRoute)?;

    let mut coordinates = Vec::with_capacity(positions.len());
    for position in positions {
        let pair = position.as_array().ok_or(DirectionsError::EmptyRoute)?;
        let (Some(lon), Some(lat)) = (
            pair.first().and_then(|v| v.as_f64()),
            pair.get(1).and_then(|v| v.as_f64()),
        ) else {
            return Err(DirectionsError::EmptyRoute);
        };
        coordinates.push((lat, lon));
    }

    if coordinates.is_empty() {
        return Err(DirectionsError::EmptyRoute);
    }
    Ok(coordinates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
