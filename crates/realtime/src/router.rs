//! Channel-based event fan-out.
//!
//! [`EventRouter`] decouples the socket transport from its consumers: a
//! consumer registers a callback for a channel name with [`on`] and the
//! connection task delivers every parsed [`ServerEvent`] through
//! [`dispatch`]. Delivery order within a channel equals registration
//! order, and a panicking callback never prevents delivery to the
//! callbacks registered after it.
//!
//! Callbacks cannot be compared in Rust, so [`on`] hands back a
//! [`SubscriptionId`] that [`off`] uses to remove that exact
//! registration.
//!
//! [`on`]: EventRouter::on
//! [`off`]: EventRouter::off
//! [`dispatch`]: EventRouter::dispatch

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::messages::ServerEvent;

/// Opaque handle identifying one callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Per-channel ordered callback registry.
///
/// Shared as `Arc<EventRouter>` between the connection task (producer)
/// and every consumer. Subscriptions deliberately survive reconnects:
/// only authentication is replayed on a new transport, never the
/// registry.
#[derive(Default)]
pub struct EventRouter {
    channels: Mutex<HashMap<String, Vec<(SubscriptionId, Callback)>>>,
    next_id: AtomicU64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a channel. Duplicates are allowed; the
    /// caller dedups if it needs to.
    pub fn on(
        &self,
        channel: &str,
        callback: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.channels
            .lock()
            .expect("router registry poisoned")
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove one registration. Returns `false` when the id is not (or
    /// no longer) registered on the channel.
    pub fn off(&self, channel: &str, id: SubscriptionId) -> bool {
        let mut channels = self.channels.lock().expect("router registry poisoned");
        match channels.get_mut(channel) {
            Some(subs) => {
                let before = subs.len();
                subs.retain(|(sub_id, _)| *sub_id != id);
                before != subs.len()
            }
            None => false,
        }
    }

    /// Remove every registration for a channel. Returns how many were
    /// dropped.
    pub fn off_channel(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .expect("router registry poisoned")
            .remove(channel)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Number of live registrations for a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .expect("router registry poisoned")
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver an event to every callback registered for its channel,
    /// in registration order.
    ///
    /// The registry lock is released before invocation, so a callback
    /// may call [`on`](Self::on)/[`off`](Self::off) without deadlocking;
    /// such changes take effect from the next dispatch.
    pub fn dispatch(&self, event: &ServerEvent) {
        let callbacks: Vec<Callback> = {
            let channels = self.channels.lock().expect("router registry poisoned");
            match channels.get(event.channel()) {
                Some(subs) => subs.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(channel = event.channel(), "Event callback panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::parse_event;

    fn cancelled_event() -> ServerEvent {
        parse_event(r#"{"event":"booking:cancelled","data":{"bookingId":"b1"}}"#).unwrap()
    }

    #[test]
    fn delivery_order_equals_registration_order() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            router.on("booking:cancelled", move |_| {
                seen.lock().unwrap().push(label);
            });
        }

        router.dispatch(&cancelled_event());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn off_removes_only_the_given_subscription() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_a = Arc::clone(&seen);
        let a = router.on("booking:cancelled", move |_| {
            seen_a.lock().unwrap().push("a");
        });
        let seen_b = Arc::clone(&seen);
        let _b = router.on("booking:cancelled", move |_| {
            seen_b.lock().unwrap().push("b");
        });

        assert!(router.off("booking:cancelled", a));
        assert!(!router.off("booking:cancelled", a));

        router.dispatch(&cancelled_event());
        assert_eq!(*seen.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn off_channel_removes_everything() {
        let router = EventRouter::new();
        router.on("booking:cancelled", |_| {});
        router.on("booking:cancelled", |_| {});

        assert_eq!(router.off_channel("booking:cancelled"), 2);
        assert_eq!(router.subscriber_count("booking:cancelled"), 0);
    }

    #[test]
    fn duplicate_callbacks_are_both_invoked() {
        let router = EventRouter::new();
        let count = Arc::new(Mutex::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            router.on("booking:cancelled", move |_| {
                *count.lock().unwrap() += 1;
            });
        }

        router.dispatch(&cancelled_event());
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn panicking_callback_does_not_block_later_callbacks() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        router.on("booking:cancelled", |_| panic!("boom"));
        let seen_after = Arc::clone(&seen);
        router.on("booking:cancelled", move |_| {
            seen_after.lock().unwrap().push("after");
        });

        router.dispatch(&cancelled_event());
        assert_eq!(*seen.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn dispatch_without_subscribers_is_a_noop() {
        let router = EventRouter::new();
        router.dispatch(&cancelled_event());
    }

    #[test]
    fn events_only_reach_their_own_channel() {
        let router = EventRouter::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = Arc::clone(&count);
        router.on("booking:accepted", move |_| {
            *count_clone.lock().unwrap() += 1;
        });

        router.dispatch(&cancelled_event());
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
