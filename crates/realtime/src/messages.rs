//! Typed socket wire messages.
//!
//! The backend frames every realtime message as
//! `{"event": "<channel>", "data": {...}}`. This module deserializes
//! inbound frames into a closed [`ServerEvent`] enum with one variant
//! per channel, and serializes outbound [`ClientAction`]s into the same
//! shape. Unknown event names fail to parse; callers log and skip them.

use serde::{Deserialize, Serialize};

use sajilo_core::channels;
use sajilo_core::identity::{WorkerProfile, WorkerRef};
use sajilo_core::types::{BookingId, LocationSample, Timestamp, UserId, WorkerId};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Which kind of client this session authenticates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Worker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Worker => "worker",
        }
    }
}

/// Worker availability values accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPresence {
    Available,
    Busy,
    Offline,
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Payload of the `authenticated` confirmation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedData {
    pub socket_id: String,
    /// Rooms the server joined this session to.
    #[serde(default)]
    pub rooms: Vec<String>,
    pub user_type: String,
}

/// A job offer pushed to workers (`booking:request`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequestData {
    #[serde(rename = "_id")]
    pub id: BookingId,
    pub service_name: String,
    pub service_category: String,
    pub price: f64,
    /// Opaque location blob; rendered, never interpreted here.
    #[serde(default)]
    pub location: Option<serde_json::Value>,
    /// Explicit assignment. Absent for open requests.
    #[serde(default)]
    pub worker_id: Option<WorkerRef>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload shared by the `booking:*` lifecycle events.
///
/// Depending on the emitting code path the backend sends either a full
/// booking object (`_id`) or a thin `{bookingId, ...}` envelope; both
/// are accepted and [`booking_id`](Self::booking_id) abstracts over it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEventData {
    #[serde(rename = "_id", default)]
    pub id: Option<BookingId>,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
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
}

impl BookingEventData {
    /// The booking this event refers to, whichever field carried it.
    pub fn booking_id(&self) -> Option<&str> {
        self.booking_id.as_deref().or(self.id.as_deref())
    }
}

/// Live worker position (`worker:location`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLocationData {
    pub worker_id: WorkerId,
    pub booking_id: BookingId,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl WorkerLocationData {
    /// Convert into the engine's sample type.
    pub fn to_sample(&self) -> LocationSample {
        LocationSample {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            timestamp_ms: self.timestamp.map(|t| t.timestamp_millis()).unwrap_or_default(),
        }
    }
}

/// Payload of `location:tracking:started` and the `navigation:*` events.
///
/// `route`, `distance` (metres) and `duration` (seconds) are only
/// present on `navigation:started`, when the worker shares its route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEventData {
    pub booking_id: BookingId,
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub route: Option<serde_json::Value>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Payload of `work:started`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStartedData {
    pub booking_id: BookingId,
    /// Server-provided start time, when the backend recorded one.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub worker_name: Option<String>,
}

impl WorkStartedData {
    /// The start time to anchor the duration ticker on: the explicit
    /// `startTime` when present, else the event timestamp.
    pub fn effective_start(&self) -> Option<Timestamp> {
        self.start_time.or(self.timestamp)
    }
}

/// Payload of `work:completed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkCompletedData {
    pub booking_id: BookingId,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// All inbound socket events, tagged by channel name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "authenticated")]
    Authenticated(AuthenticatedData),

    #[serde(rename = "booking:request")]
    BookingRequest(BookingRequestData),

    #[serde(rename = "booking:accepted")]
    BookingAccepted(BookingEventData),
    #[serde(rename = "booking:rejected")]
    BookingRejected(BookingEventData),
    #[serde(rename = "booking:started")]
    BookingStarted(BookingEventData),
    #[serde(rename = "booking:completed")]
    BookingCompleted(BookingEventData),
    #[serde(rename = "booking:cancelled")]
    BookingCancelled(BookingEventData),
    #[serde(rename = "booking:updated")]
    BookingUpdated(BookingEventData),

    #[serde(rename = "worker:location")]
    WorkerLocation(WorkerLocationData),
    #[serde(rename = "location:tracking:started")]
    TrackingStarted(NavigationEventData),

    #[serde(rename = "navigation:started")]
    NavigationStarted(NavigationEventData),
    #[serde(rename = "navigation:arrived")]
    NavigationArrived(NavigationEventData),
    #[serde(rename = "navigation:ended")]
    NavigationEnded(NavigationEventData),

    #[serde(rename = "work:started")]
    WorkStarted(WorkStartedData),
    #[serde(rename = "work:completed")]
    WorkCompleted(WorkCompletedData),

    #[serde(rename = "notification:new")]
    NotificationNew(serde_json::Value),
    #[serde(rename = "notification:read")]
    NotificationRead(serde_json::Value),
    #[serde(rename = "notification:deleted")]
    NotificationDeleted(serde_json::Value),
}

impl ServerEvent {
    /// The channel this event arrived on, for router dispatch.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => channels::AUTHENTICATED,
            Self::BookingRequest(_) => channels::BOOKING_REQUEST,
            Self::BookingAccepted(_) => channels::BOOKING_ACCEPTED,
            Self::BookingRejected(_) => channels::BOOKING_REJECTED,
            Self::BookingStarted(_) => channels::BOOKING_STARTED,
            Self::BookingCompleted(_) => channels::BOOKING_COMPLETED,
            Self::BookingCancelled(_) => channels::BOOKING_CANCELLED,
            Self::BookingUpdated(_) => channels::BOOKING_UPDATED,
            Self::WorkerLocation(_) => channels::WORKER_LOCATION,
            Self::TrackingStarted(_) => channels::TRACKING_STARTED,
            Self::NavigationStarted(_) => channels::NAVIGATION_STARTED,
            Self::NavigationArrived(_) => channels::NAVIGATION_ARRIVED,
            Self::NavigationEnded(_) => channels::NAVIGATION_ENDED,
            Self::WorkStarted(_) => channels::WORK_STARTED,
            Self::WorkCompleted(_) => channels::WORK_COMPLETED,
            Self::NotificationNew(_) => channels::NOTIFICATION_NEW,
            Self::NotificationRead(_) => channels::NOTIFICATION_READ,
            Self::NotificationDeleted(_) => channels::NOTIFICATION_DELETED,
        }
    }

    /// Structural guard applied after deserialization.
    ///
    /// Lifecycle events without any booking id and location pushes with
    /// non-finite coordinates are dropped before they reach the router.
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::BookingAccepted(data)
            | Self::BookingRejected(data)
            | Self::BookingStarted(data)
            | Self::BookingCompleted(data)
            | Self::BookingCancelled(data)
            | Self::BookingUpdated(data) => {
                if data.booking_id().is_none() {
                    return Err("booking lifecycle event without a booking id".to_string());
                }
            }
            Self::WorkerLocation(data) => {
                if !data.latitude.is_finite() || !data.longitude.is_finite() {
                    return Err(format!(
                        "non-finite coordinates ({}, {})",
                        data.latitude, data.longitude
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Errors produced while turning a text frame into a [`ServerEvent`].
#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    /// Malformed JSON or an unknown `event` name.
    #[error("Malformed event frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid JSON that fails the payload guard.
    #[error("Invalid event payload: {0}")]
    Invalid(String),
}

/// Parse and guard-check one inbound text frame.
pub fn parse_event(text: &str) -> Result<ServerEvent, EventParseError> {
    let event: ServerEvent = serde_json::from_str(text)?;
    event.validate().map_err(EventParseError::Invalid)?;
    Ok(event)
}

// ---------------------------------------------------------------------------
// ClientAction
// ---------------------------------------------------------------------------

/// All outbound socket actions, tagged by channel name.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientAction {
    #[serde(rename = "authenticate", rename_all = "camelCase")]
    Authenticate { user_id: UserId, user_type: Role },

    #[serde(rename = "booking:accept", rename_all = "camelCase")]
    BookingAccept { booking_id: BookingId, worker_id: WorkerId },
    #[serde(rename = "booking:reject", rename_all = "camelCase")]
    BookingReject {
        booking_id: BookingId,
        worker_id: WorkerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "booking:start", rename_all = "camelCase")]
    BookingStart { booking_id: BookingId, worker_id: WorkerId },
    #[serde(rename = "booking:complete", rename_all = "camelCase")]
    BookingComplete { booking_id: BookingId, worker_id: WorkerId },

    #[serde(rename = "location_update")]
    LocationUpdate {
        latitude: f64,
        longitude: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        accuracy: Option<f64>,
    },

    #[serde(rename = "worker:status_change")]
    WorkerStatusChange { status: WorkerPresence },
    #[serde(rename = "worker:status_update")]
    WorkerStatusUpdate { status: WorkerPresence },
}

impl ClientAction {
    /// The channel this action is emitted on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => channels::AUTHENTICATE,
            Self::BookingAccept { .. } => channels::BOOKING_ACCEPT,
            Self::BookingReject { .. } => channels::BOOKING_REJECT,
            Self::BookingStart { .. } => channels::BOOKING_START,
            Self::BookingComplete { .. } => channels::BOOKING_COMPLETE,
            Self::LocationUpdate { .. } => channels::LOCATION_UPDATE,
            Self::WorkerStatusChange { .. } => channels::WORKER_STATUS_CHANGE,
            Self::WorkerStatusUpdate { .. } => channels::WORKER_STATUS_UPDATE,
        }
    }

    /// Serialize into a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_authenticated() {
        let json = r#"{"event":"authenticated","data":{"socketId":"s-1","rooms":["user:u1"],"userType":"user"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::Authenticated(data) => {
            assert_eq!(data.socket_id, "s-1");
            assert_eq!(data.rooms, vec!["user:u1"]);
            assert_eq!(data.user_type, "user");
        });
    }

    #[test]
    fn parse_booking_request_with_assignment() {
        let json = r#"{"event":"booking:request","data":{"_id":"b1","serviceName":"Plumbing","serviceCategory":"plumbing","price":1500,"location":{"address":"Patan"},"workerId":"w1"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::BookingRequest(data) => {
            assert_eq!(data.id, "b1");
            assert_eq!(data.service_name, "Plumbing");
            assert_eq!(data.price, 1500.0);
            assert_matches!(data.worker_id, Some(WorkerRef::Id(ref id)) if id == "w1");
        });
    }

    #[test]
    fn parse_booking_accepted_full_object() {
        let json = r#"{"event":"booking:accepted","data":{"_id":"b1","status":"accepted","worker":{"firstName":"Sita","lastName":"Rai"}}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::BookingAccepted(data) => {
            assert_eq!(data.booking_id(), Some("b1"));
            assert_eq!(data.status.as_deref(), Some("accepted"));
        });
    }

    #[test]
    fn parse_booking_event_thin_envelope() {
        let json = r#"{"event":"booking:cancelled","data":{"bookingId":"b9"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::BookingCancelled(data) => {
            assert_eq!(data.booking_id(), Some("b9"));
        });
    }

    #[test]
    fn booking_event_without_any_id_is_invalid() {
        let json = r#"{"event":"booking:updated","data":{"status":"accepted"}}"#;
        assert_matches!(parse_event(json), Err(EventParseError::Invalid(_)));
    }

    #[test]
    fn parse_worker_location() {
        let json = r#"{"event":"worker:location","data":{"workerId":"w1","bookingId":"b1","latitude":27.7172,"longitude":85.324,"accuracy":5.0,"timestamp":"2025-06-01T10:00:00Z"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::WorkerLocation(data) => {
            let sample = data.to_sample();
            assert_eq!(sample.latitude, 27.7172);
            assert_eq!(sample.accuracy, Some(5.0));
            assert!(sample.timestamp_ms > 0);
        });
    }

    #[test]
    fn worker_location_with_null_coordinate_fails_parse() {
        let json = r#"{"event":"worker:location","data":{"workerId":"w1","bookingId":"b1","latitude":null,"longitude":85.3}}"#;
        assert_matches!(parse_event(json), Err(EventParseError::Json(_)));
    }

    #[test]
    fn parse_navigation_started_with_route() {
        let json = r#"{"event":"navigation:started","data":{"bookingId":"b1","workerId":"w1","timestamp":"2025-06-01T10:00:00Z","route":{"type":"LineString"},"distance":2200.0,"duration":420.0}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::NavigationStarted(data) => {
            assert_eq!(data.distance, Some(2200.0));
            assert_eq!(data.duration, Some(420.0));
            assert!(data.route.is_some());
        });
    }

    #[test]
    fn work_started_prefers_explicit_start_time() {
        let json = r#"{"event":"work:started","data":{"bookingId":"b1","startTime":"2025-06-01T10:00:00Z","timestamp":"2025-06-01T10:05:00Z"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::WorkStarted(data) => {
            let start = data.effective_start().unwrap();
            assert_eq!(start.to_rfc3339(), "2025-06-01T10:00:00+00:00");
        });
    }

    #[test]
    fn work_started_falls_back_to_event_timestamp() {
        let json = r#"{"event":"work:started","data":{"bookingId":"b1","timestamp":"2025-06-01T10:05:00Z"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::WorkStarted(data) => {
            assert!(data.effective_start().is_some());
        });
    }

    #[test]
    fn parse_work_completed() {
        let json = r#"{"event":"work:completed","data":{"bookingId":"b1","paymentMethod":"cash","price":1800,"workerName":"Sita Rai"}}"#;
        let event = parse_event(json).unwrap();
        assert_matches!(event, ServerEvent::WorkCompleted(data) => {
            assert_eq!(data.payment_method.as_deref(), Some("cash"));
            assert_eq!(data.price, Some(1800.0));
        });
    }

    #[test]
    fn unknown_event_name_is_a_parse_error() {
        let json = r#"{"event":"booking:paused","data":{}}"#;
        assert_matches!(parse_event(json), Err(EventParseError::Json(_)));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert_matches!(parse_event("not json"), Err(EventParseError::Json(_)));
    }

    #[test]
    fn channel_mapping_matches_constants() {
        let json = r#"{"event":"location:tracking:started","data":{"bookingId":"b1"}}"#;
        let event = parse_event(json).unwrap();
        assert_eq!(event.channel(), channels::TRACKING_STARTED);
    }

    #[test]
    fn authenticate_action_wire_shape() {
        let action = ClientAction::Authenticate {
            user_id: "u1".to_string(),
            user_type: Role::Worker,
        };
        let value: serde_json::Value =
            serde_json::from_str(&action.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "authenticate",
                "data": {"userId": "u1", "userType": "worker"}
            })
        );
    }

    #[test]
    fn location_update_omits_missing_accuracy() {
        let action = ClientAction::LocationUpdate {
            latitude: 27.7,
            longitude: 85.3,
            accuracy: None,
        };
        let value: serde_json::Value =
            serde_json::from_str(&action.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "location_update",
                "data": {"latitude": 27.7, "longitude": 85.3}
            })
        );
    }

    #[test]
    fn booking_reject_carries_reason() {
        let action = ClientAction::BookingReject {
            booking_id: "b1".to_string(),
            worker_id: "w1".to_string(),
            reason: Some("too far".to_string()),
        };
        let value: serde_json::Value =
            serde_json::from_str(&action.to_frame().unwrap()).unwrap();
        assert_eq!(value["data"]["reason"], "too far");
        assert_eq!(action.channel(), channels::BOOKING_REJECT);
    }
}
