//! Worker-side booking request listener.
//!
//! A worker that is "listening" must surface every `booking:request`
//! addressed to it, across reconnects. [`BookingRequestListener`] wires
//! the filter callback into the shared router, connects the session as
//! role `worker`, and arms a periodic self-check that forces a
//! reconnect whenever the manager reports not-connected while the
//! listener is supposed to be active.
//!
//! Category and verification filtering stay with the caller; this layer
//! only drops requests explicitly assigned to a different worker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sajilo_core::channels;
use sajilo_core::identity::WorkerRef;
use sajilo_core::types::WorkerId;

use crate::messages::{BookingRequestData, Role, ServerEvent};
use crate::router::SubscriptionId;
use crate::socket::SocketManager;

/// How often the listener verifies the session is still up.
const SELF_CHECK_INTERVAL: Duration = Duration::from_secs(30);

struct ActiveListener {
    subscription: SubscriptionId,
    self_check: CancellationToken,
}

/// Keeps a worker subscribed to incoming job offers.
pub struct BookingRequestListener {
    manager: Arc<SocketManager>,
    active: Mutex<Option<ActiveListener>>,
}

impl BookingRequestListener {
    pub fn new(manager: Arc<SocketManager>) -> Self {
        Self {
            manager,
            active: Mutex::new(None),
        }
    }

    /// Connect as `worker` and surface matching booking requests to the
    /// callback. Calling again replaces the previous registration.
    pub fn start_listening(
        &self,
        worker_id: impl Into<WorkerId>,
        callback: impl Fn(&BookingRequestData) + Send + Sync + 'static,
    ) {
        let worker_id = worker_id.into();
        self.remove_active();

        self.manager.connect(worker_id.clone(), Role::Worker);

        let filter_id = worker_id.clone();
        let subscription = self.manager.router().on(channels::BOOKING_REQUEST, move |event| {
            if let ServerEvent::BookingRequest(request) = event {
                if should_surface(request, &filter_id) {
                    callback(request);
                } else {
                    tracing::debug!(
                        booking_id = %request.id,
                        "Dismissing request assigned to another worker"
                    );
                }
            }
        });

        let self_check = CancellationToken::new();
        spawn_self_check(
            Arc::clone(&self.manager),
            worker_id,
            self_check.clone(),
        );

        *self.active.lock().expect("listener state poisoned") = Some(ActiveListener {
            subscription,
            self_check,
        });

        tracing::info!("Booking request listener started");
    }

    /// Remove every handler this listener registered and disconnect.
    /// Safe to call at any time, including when not listening.
    pub fn stop_listening(&self) {
        if self.remove_active() {
            self.manager.disconnect();
            tracing::info!("Booking request listener stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.active.lock().expect("listener state poisoned").is_some()
    }

    /// Drop the current registration, if any. Returns whether one existed.
    fn remove_active(&self) -> bool {
        let previous = self.active.lock().expect("listener state poisoned").take();
        match previous {
            Some(active) => {
                self.manager
                    .router()
                    .off(channels::BOOKING_REQUEST, active.subscription);
                active.self_check.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for BookingRequestListener {
    fn drop(&mut self) {
        self.remove_active();
    }
}

/// Watchdog: while listening, periodically force a reconnect attempt if
/// the session is down (the manager's own backoff may have given up, or
/// the drop may have gone unnoticed while the app was backgrounded).
fn spawn_self_check(manager: Arc<SocketManager>, worker_id: WorkerId, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SELF_CHECK_INTERVAL);
        interval.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if !manager.is_connected() {
                        tracing::warn!("Listener self-check found session down, reconnecting");
                        manager.connect(worker_id.clone(), Role::Worker);
                    }
                }
            }
        }
    });
}

/// Whether a request belongs to this worker. Open (unassigned) requests
/// always surface; the caller filters further by category/verification.
fn should_surface(request: &BookingRequestData, worker_id: &str) -> bool {
    match &request.worker_id {
        None => true,
        Some(WorkerRef::Id(id)) => id == worker_id,
        Some(WorkerRef::Expanded(profile)) => match &profile.id {
            Some(id) => id == worker_id,
            None => true,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
