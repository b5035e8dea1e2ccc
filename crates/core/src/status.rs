//! Booking, navigation, and work state machines.
//!
//! `BookingStatus` is the server-authoritative lifecycle value; it is
//! parsed from the wire and never derived locally. `NavStatus` and
//! `WorkStatus` are client-local projections seeded and advanced by
//! discrete socket events. Both advance monotonically: events can arrive
//! out of order, duplicated, or not at all, so a later stage always wins
//! and an earlier-stage event is ignored rather than rejected.

use serde::{Deserialize, Serialize};

use crate::channels;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// BookingStatus (server-authoritative)
// ---------------------------------------------------------------------------

/// Server-side booking lifecycle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Wire value as the backend spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a wire value.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }

    /// Whether the booking has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// NavStatus (client-local)
// ---------------------------------------------------------------------------

/// Client-local navigation progression for the live-tracking view.
///
/// Ordered: `Pending → Accepted → Tracking → Navigating → Arrived → Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavStatus {
    #[default]
    Pending,
    Accepted,
    Tracking,
    Navigating,
    Arrived,
    Ended,
}

impl NavStatus {
    /// Position in the forward progression. Higher never yields to lower.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Accepted => 1,
            Self::Tracking => 2,
            Self::Navigating => 3,
            Self::Arrived => 4,
            Self::Ended => 5,
        }
    }

    /// Apply an incoming stage, keeping whichever is further along.
    #[must_use]
    pub fn advance(self, incoming: NavStatus) -> NavStatus {
        if incoming.rank() > self.rank() {
            incoming
        } else {
            self
        }
    }

    /// The stage a given socket channel seeds, if any.
    pub fn for_channel(channel: &str) -> Option<NavStatus> {
        match channel {
            channels::BOOKING_ACCEPTED => Some(Self::Accepted),
            channels::TRACKING_STARTED => Some(Self::Tracking),
            channels::NAVIGATION_STARTED => Some(Self::Navigating),
            channels::NAVIGATION_ARRIVED => Some(Self::Arrived),
            channels::NAVIGATION_ENDED => Some(Self::Ended),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkStatus (client-local)
// ---------------------------------------------------------------------------

/// Client-local work-session progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl WorkStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    /// Apply an incoming stage, keeping whichever is further along.
    #[must_use]
    pub fn advance(self, incoming: WorkStatus) -> WorkStatus {
        if incoming.rank() > self.rank() {
            incoming
        } else {
            self
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_status_round_trips_wire_values() {
        for value in ["pending", "accepted", "in_progress", "completed", "cancelled"] {
            assert_eq!(BookingStatus::parse(value).unwrap().as_str(), value);
        }
    }

    #[test]
    fn booking_status_rejects_unknown_values() {
        assert!(BookingStatus::parse("paused").is_err());
        assert!(BookingStatus::parse("").is_err());
    }

    #[test]
    fn nav_status_advances_forward() {
        let s = NavStatus::Pending.advance(NavStatus::Tracking);
        assert_eq!(s, NavStatus::Tracking);
    }

    #[test]
    fn nav_status_never_regresses() {
        let s = NavStatus::Arrived.advance(NavStatus::Navigating);
        assert_eq!(s, NavStatus::Arrived);
    }

    #[test]
    fn nav_status_out_of_order_replay_converges() {
        // Replay started/arrived/ended in every order; the result must
        // always be Ended and intermediate states must never move backward.
        let events = [NavStatus::Navigating, NavStatus::Arrived, NavStatus::Ended];
        let permutations: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for perm in permutations {
            let mut status = NavStatus::Pending;
            let mut seen_rank = 0;
            for idx in perm {
                status = status.advance(events[idx]);
                assert!(status.rank() >= seen_rank, "regressed in {perm:?}");
                seen_rank = status.rank();
            }
            assert_eq!(status, NavStatus::Ended, "permutation {perm:?}");
        }
    }

    #[test]
    fn nav_status_channel_mapping() {
        assert_eq!(
            NavStatus::for_channel("location:tracking:started"),
            Some(NavStatus::Tracking)
        );
        assert_eq!(NavStatus::for_channel("navigation:ended"), Some(NavStatus::Ended));
        assert_eq!(NavStatus::for_channel("worker:location"), None);
    }

    #[test]
    fn work_status_duplicate_events_are_idempotent() {
        let s = WorkStatus::InProgress.advance(WorkStatus::InProgress);
        assert_eq!(s, WorkStatus::InProgress);
    }

    #[test]
    fn work_status_never_regresses() {
        let s = WorkStatus::Completed.advance(WorkStatus::InProgress);
        assert_eq!(s, WorkStatus::Completed);
    }
}
