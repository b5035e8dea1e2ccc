//! Client-side projection of a booking for the tracking UI.

use serde::Serialize;

use sajilo_core::completion::CompletionFlow;
use sajilo_core::status::{BookingStatus, NavStatus, WorkStatus};
use sajilo_core::types::{BookingId, LocationSample, Timestamp};

/// Everything the live-tracking screen renders for one booking.
///
/// `status` mirrors the server; `nav_status` and `work_status` are the
/// client-local state machines. The struct holds plain value copies
/// only, never references back into the engines that feed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub nav_status: NavStatus,
    pub work_status: WorkStatus,
    pub work_start_time: Option<Timestamp>,
    /// Elapsed work time, maintained by the 1 s ticker while work is
    /// in progress.
    pub work_duration_secs: u64,
    pub eta_minutes: u32,
    pub distance_km: f64,
    pub worker_location: Option<LocationSample>,
    pub worker_name: String,
    pub worker_phone: Option<String>,
    pub worker_photo: Option<String>,
    /// Set once `work:completed` lands; routes the hand-off flow.
    pub completion: Option<CompletionFlow>,
}

impl BookingView {
    pub fn new(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            status: BookingStatus::Pending,
            nav_status: NavStatus::Pending,
            work_status: WorkStatus::NotStarted,
            work_start_time: None,
            work_duration_secs: 0,
            eta_minutes: 0,
            distance_km: 0.0,
            worker_location: None,
            worker_name: "Awaiting assignment".to_string(),
            worker_phone: None,
            worker_photo: None,
            completion: None,
        }
    }
}
