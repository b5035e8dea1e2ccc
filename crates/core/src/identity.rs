//! Worker display-info resolution.
//!
//! A booking can carry worker details in three places, in decreasing
//! order of trust: an expanded `worker` object, the `workerId` field
//! (which arrives either as a bare id string or as an expanded object),
//! and a separately fetched worker record. Every screen that shows a
//! worker's name, phone, or photo must apply the same precedence, so it
//! lives here as a pure function.

use serde::{Deserialize, Serialize};

use crate::status::BookingStatus;
use crate::types::WorkerId;

/// Shown while a booking is still pending and no worker is assigned.
const FALLBACK_UNASSIGNED: &str = "Awaiting assignment";

/// Shown when a worker exists but no usable name field survived.
const FALLBACK_ASSIGNED: &str = "Worker";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Worker details as they appear embedded in bookings or fetched from
/// `GET /api/workers/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

/// The `workerId` field of a booking: either a bare id or an expanded
/// worker object, depending on which endpoint produced the booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerRef {
    Id(WorkerId),
    Expanded(WorkerProfile),
}

impl WorkerRef {
    /// The expanded profile, when this reference carries one.
    pub fn profile(&self) -> Option<&WorkerProfile> {
        match self {
            Self::Id(_) => None,
            Self::Expanded(profile) => Some(profile),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Best display name a single profile can produce: explicit `name`
/// first, else first/last composition (either part alone is acceptable).
fn profile_name(profile: &WorkerProfile) -> Option<String> {
    if let Some(name) = non_empty(&profile.name) {
        return Some(name.to_string());
    }

    match (non_empty(&profile.first_name), non_empty(&profile.last_name)) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first.to_string()),
        (None, Some(last)) => Some(last.to_string()),
        (None, None) => None,
    }
}

/// Resolve a worker's display name.
///
/// Precedence: the booking's embedded `worker` object, then an expanded
/// `workerId`, then the separately fetched record. When nothing usable
/// remains, the fallback depends on whether the booking is still
/// unassigned (`pending`).
pub fn resolve_worker_name(
    worker: Option<&WorkerProfile>,
    worker_ref: Option<&WorkerRef>,
    fetched: Option<&WorkerProfile>,
    booking_status: BookingStatus,
) -> String {
    worker
        .and_then(profile_name)
        .or_else(|| worker_ref.and_then(WorkerRef::profile).and_then(profile_name))
        .or_else(|| fetched.and_then(profile_name))
        .unwrap_or_else(|| {
            if booking_status == BookingStatus::Pending {
                FALLBACK_UNASSIGNED.to_string()
            } else {
                FALLBACK_ASSIGNED.to_string()
            }
        })
}

/// Resolve a worker's phone number with the same source precedence.
pub fn resolve_worker_phone(
    worker: Option<&WorkerProfile>,
    worker_ref: Option<&WorkerRef>,
    fetched: Option<&WorkerProfile>,
) -> Option<String> {
    resolve_field(worker, worker_ref, fetched, |p| non_empty(&p.phone))
}

/// Resolve a worker's photo URL with the same source precedence.
pub fn resolve_worker_photo(
    worker: Option<&WorkerProfile>,
    worker_ref: Option<&WorkerRef>,
    fetched: Option<&WorkerProfile>,
) -> Option<String> {
    resolve_field(worker, worker_ref, fetched, |p| non_empty(&p.photo))
}

fn resolve_field<'a>(
    worker: Option<&'a WorkerProfile>,
    worker_ref: Option<&'a WorkerRef>,
    fetched: Option<&'a WorkerProfile>,
    field: impl Fn(&'a WorkerProfile) -> Option<&'a str>,
) -> Option<String> {
    worker
        .and_then(&field)
        .or_else(|| worker_ref.and_then(WorkerRef::profile).and_then(&field))
        .or_else(|| fetched.and_then(&field))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
