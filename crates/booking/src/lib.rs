//! Booking lifecycle reconciliation and the backend REST client.
//!
//! - [`BookingApi`] — REST collaborators with a 10 s abort timeout.
//! - [`BookingView`] — the client-side projection the tracking UI renders.
//! - [`BookingTracker`] — optimistic event mutations reconciled against
//!   debounced authoritative refetches and a backstop poll.

pub mod api;
pub mod tracker;
pub mod view;

pub use api::{BookingApi, BookingApiError, BookingRecord};
pub use tracker::{BookingTracker, TrackerConfig};
pub use view::BookingView;
