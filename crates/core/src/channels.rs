//! Well-known socket channel name constants.
//!
//! These must match the event names the backend emits and accepts. The
//! wire-message enums in the realtime crate, the router registrations in
//! the booking tracker, and the listener all reference these constants,
//! never inline string literals.

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Outbound authentication action sent after every (re)connect.
pub const AUTHENTICATE: &str = "authenticate";

/// Inbound confirmation that the server accepted our authentication.
pub const AUTHENTICATED: &str = "authenticated";

// ---------------------------------------------------------------------------
// Booking lifecycle (inbound)
// ---------------------------------------------------------------------------

/// A new job offer addressed to (or open for) a worker.
pub const BOOKING_REQUEST: &str = "booking:request";

pub const BOOKING_ACCEPTED: &str = "booking:accepted";
pub const BOOKING_REJECTED: &str = "booking:rejected";
pub const BOOKING_STARTED: &str = "booking:started";
pub const BOOKING_COMPLETED: &str = "booking:completed";
pub const BOOKING_CANCELLED: &str = "booking:cancelled";
pub const BOOKING_UPDATED: &str = "booking:updated";

// ---------------------------------------------------------------------------
// Location & navigation (inbound)
// ---------------------------------------------------------------------------

/// Live worker position push.
pub const WORKER_LOCATION: &str = "worker:location";

/// The worker's device began streaming positions for a booking.
pub const TRACKING_STARTED: &str = "location:tracking:started";

pub const NAVIGATION_STARTED: &str = "navigation:started";
pub const NAVIGATION_ARRIVED: &str = "navigation:arrived";
pub const NAVIGATION_ENDED: &str = "navigation:ended";

// ---------------------------------------------------------------------------
// Work session (inbound)
// ---------------------------------------------------------------------------

pub const WORK_STARTED: &str = "work:started";
pub const WORK_COMPLETED: &str = "work:completed";

// ---------------------------------------------------------------------------
// Notifications (inbound)
// ---------------------------------------------------------------------------

pub const NOTIFICATION_NEW: &str = "notification:new";
pub const NOTIFICATION_READ: &str = "notification:read";
pub const NOTIFICATION_DELETED: &str = "notification:deleted";

// ---------------------------------------------------------------------------
// Client actions (outbound)
// ---------------------------------------------------------------------------

pub const BOOKING_ACCEPT: &str = "booking:accept";
pub const BOOKING_REJECT: &str = "booking:reject";
pub const BOOKING_START: &str = "booking:start";
pub const BOOKING_COMPLETE: &str = "booking:complete";

/// Outbound device position update.
pub const LOCATION_UPDATE: &str = "location_update";

pub const WORKER_STATUS_CHANGE: &str = "worker:status_change";
pub const WORKER_STATUS_UPDATE: &str = "worker:status_update";
