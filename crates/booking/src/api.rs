//! REST client for the booking backend.
//!
//! Wraps the endpoints the reconciler and the worker flows consume.
//! Every call is bounded by a 10 second abort timeout; a refetch that
//! hangs must never stall the tracking screen.

use std::time::Duration;

use serde::Deserialize;

use sajilo_core::identity::{WorkerProfile, WorkerRef};
use sajilo_core::types::BookingId;
use sajilo_realtime::WorkerPresence;

/// Abort timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the booking REST layer.
#[derive(Debug, thiserror::Error)]
pub enum BookingApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// Booking fields the reconciler reads. Everything else in the server's
/// booking document is passed through untouched by this subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    #[serde(rename = "_id")]
    pub id: BookingId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub worker: Option<WorkerProfile>,
    #[serde(default)]
    pub worker_id: Option<WorkerRef>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub service_name: Option<String>,
}

/// HTTP client for the booking backend.
pub struct BookingApi {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl BookingApi {
    /// * `base_url` - origin of the backend, e.g. `https://api.example.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into(),
            bearer_token: None,
        }
    }

    /// Attach the session's bearer token to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// `GET /api/bookings/{id}` - the authoritative booking state.
    pub async fn get_booking(&self, id: &str) -> Result<BookingRecord, BookingApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/bookings/{id}"))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET /api/workers/{id}` - a worker's public profile.
    pub async fn get_worker(&self, id: &str) -> Result<WorkerProfile, BookingApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/workers/{id}"))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `PATCH /api/workers/update-location` - persist the device position.
    pub async fn update_worker_location(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<(), BookingApiError> {
        let mut body = serde_json::json!({
            "latitude": latitude,
            "longitude": longitude,
        });
        if let Some(accuracy) = accuracy {
            body["accuracy"] = serde_json::json!(accuracy);
        }

        let response = self
            .request(reqwest::Method::PATCH, "/api/workers/update-location")
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `PATCH /api/workers/update-status` - worker availability.
    pub async fn update_worker_status(
        &self,
        status: WorkerPresence,
    ) -> Result<(), BookingApiError> {
        let response = self
            .request(reqwest::Method::PATCH, "/api/workers/update-status")
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `PATCH /api/bookings/{id}/payment` - record the chosen payment method.
    pub async fn update_payment(
        &self,
        booking_id: &str,
        payment_method: &str,
    ) -> Result<(), BookingApiError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/api/bookings/{booking_id}/payment"),
            )
            .json(&serde_json::json!({ "paymentMethod": payment_method }))
            .send()
            .await?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BookingApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BookingApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON body into `T`, unwrapping the backend's
    /// optional `{"data": ...}` envelope when present.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BookingApiError> {
        let response = Self::ensure_success(response).await?;
        let mut value: serde_json::Value = response.json().await?;
        if let Some(inner) = value.get_mut("data") {
            if inner.is_object() {
                value = inner.take();
            }
        }
        serde_json::from_value(value).map_err(|e| BookingApiError::Api {
            status: 200,
            body: format!("unexpected response shape: {e}"),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<(), BookingApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
