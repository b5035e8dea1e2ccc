//! Booking lifecycle reconciliation.
//!
//! [`BookingTracker`] keeps one [`BookingView`] consistent while events
//! arrive out of order, duplicated, or not at all. Every handled event
//! performs a targeted optimistic mutation and schedules a debounced
//! authoritative refetch; an independent backstop poll refetches
//! unconditionally in case a socket event was missed entirely (the app
//! may have been backgrounded when it fired). Refetch failures keep
//! the previous state: stale-but-present beats empty.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use sajilo_core::channels;
use sajilo_core::completion::completion_flow;
use sajilo_core::geo::{eta_minutes, EtaPrecedence};
use sajilo_core::identity::{
    resolve_worker_name, resolve_worker_phone, resolve_worker_photo, WorkerProfile, WorkerRef,
};
use sajilo_core::status::{BookingStatus, NavStatus, WorkStatus};
use sajilo_core::types::BookingId;
use sajilo_realtime::router::SubscriptionId;
use sajilo_realtime::messages::{BookingEventData, NavigationEventData, ServerEvent};
use sajilo_realtime::SocketManager;
use sajilo_routing::RouteResult;

use crate::api::{BookingApi, BookingRecord};
use crate::view::BookingView;

/// Channels the tracker subscribes to for its booking.
const TRACKED_CHANNELS: [&str; 13] = [
    channels::BOOKING_ACCEPTED,
    channels::BOOKING_REJECTED,
    channels::BOOKING_STARTED,
    channels::BOOKING_COMPLETED,
    channels::BOOKING_CANCELLED,
    channels::BOOKING_UPDATED,
    channels::WORKER_LOCATION,
    channels::TRACKING_STARTED,
    channels::NAVIGATION_STARTED,
    channels::NAVIGATION_ARRIVED,
    channels::NAVIGATION_ENDED,
    channels::WORK_STARTED,
    channels::WORK_COMPLETED,
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable timings and the ETA source preference.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between an event's optimistic mutation and the
    /// authoritative refetch. A newer event supersedes a pending one.
    pub refetch_debounce: Duration,
    /// Unconditional backstop poll interval.
    pub poll_interval: Duration,
    pub eta_precedence: EtaPrecedence,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refetch_debounce: Duration::from_millis(500),
            poll_interval: Duration::from_secs(30),
            eta_precedence: EtaPrecedence::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// BookingTracker
// ---------------------------------------------------------------------------

/// Tracks one booking for the lifetime of a tracking screen.
pub struct BookingTracker {
    inner: Arc<TrackerInner>,
    manager: Arc<SocketManager>,
    subscriptions: Mutex<Vec<(&'static str, SubscriptionId)>>,
    view_rx: watch::Receiver<BookingView>,
}

struct TrackerInner {
    booking_id: BookingId,
    api: Arc<BookingApi>,
    config: TrackerConfig,
    view: Mutex<BookingView>,
    view_tx: watch::Sender<BookingView>,
    /// Worker info sources, in resolution precedence order.
    worker: Mutex<Option<WorkerProfile>>,
    worker_ref: Mutex<Option<WorkerRef>>,
    fetched_worker: Mutex<Option<WorkerProfile>>,
    worker_fetch_started: AtomicBool,
    payment_method: Mutex<Option<String>>,
    refetch_generation: AtomicU64,
    /// 1 s work-duration ticker, present only while work is running.
    ticker: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl BookingTracker {
    /// Subscribe to the booking's event channels, run the initial
    /// fetch, and arm the backstop poll.
    pub fn start(
        api: Arc<BookingApi>,
        manager: Arc<SocketManager>,
        config: TrackerConfig,
        booking_id: impl Into<BookingId>,
    ) -> Self {
        let booking_id = booking_id.into();
        let (view_tx, view_rx) = watch::channel(BookingView::new(booking_id.clone()));

        let inner = Arc::new(TrackerInner {
            view: Mutex::new(BookingView::new(booking_id.clone())),
            booking_id,
            api,
            config,
            view_tx,
            worker: Mutex::new(None),
            worker_ref: Mutex::new(None),
            fetched_worker: Mutex::new(None),
            worker_fetch_started: AtomicBool::new(false),
            payment_method: Mutex::new(None),
            refetch_generation: AtomicU64::new(0),
            ticker: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        let mut subscriptions = Vec::with_capacity(TRACKED_CHANNELS.len());
        for channel in TRACKED_CHANNELS {
            let handler = Arc::clone(&inner);
            let id = manager
                .router()
                .on(channel, move |event| handler.handle_event(event));
            subscriptions.push((channel, id));
        }

        // Backstop poll; the immediate first tick doubles as the
        // initial authoritative fetch.
        let poll_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_inner.config.poll_interval);
            loop {
                tokio::select! {
                    _ = poll_inner.cancel.cancelled() => {
                        tracing::debug!("Booking poll stopped");
                        return;
                    }
                    _ = interval.tick() => poll_inner.refetch().await,
                }
            }
        });

        tracing::info!(booking_id = %inner.booking_id, "Booking tracker started");
        Self {
            inner,
            manager,
            subscriptions: Mutex::new(subscriptions),
            view_rx,
        }
    }

    /// Current snapshot.
    pub fn view(&self) -> BookingView {
        self.view_rx.borrow().clone()
    }

    /// Watch every view change (UI binding).
    pub fn watch(&self) -> watch::Receiver<BookingView> {
        self.view_rx.clone()
    }

    /// Feed a route engine result into the view's distance/ETA fields.
    pub fn apply_route(&self, route: &RouteResult) {
        let precedence = self.inner.config.eta_precedence;
        self.inner.mutate(|view| {
            view.distance_km = route.distance_m / 1000.0;
            let duration = (route.duration_secs > 0.0).then_some(route.duration_secs as u32);
            view.eta_minutes = eta_minutes(precedence, duration, view.distance_km);
        });
    }

    /// Unsubscribe and cancel every timer. Safe to call repeatedly and
    /// at any point, including while a refetch is in flight (its
    /// result is discarded).
    pub fn stop(&self) {
        let subs: Vec<_> = {
            let mut subscriptions = self.subscriptions.lock().expect("tracker state poisoned");
            subscriptions.drain(..).collect()
        };
        if subs.is_empty() {
            return;
        }
        for (channel, id) in subs {
            self.manager.router().off(channel, id);
        }
        self.inner.cancel.cancel();
        self.inner.stop_work_ticker();
        tracing::info!(booking_id = %self.inner.booking_id, "Booking tracker stopped");
    }
}

impl Drop for BookingTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Event handling
// ---------------------------------------------------------------------------

impl TrackerInner {
    fn handle_event(self: &Arc<Self>, event: &ServerEvent) {
        match event {
            ServerEvent::BookingAccepted(data) => self.handle_booking_event(
                data,
                Some(BookingStatus::Accepted),
                Some(NavStatus::Accepted),
            ),
            ServerEvent::BookingRejected(data) => self.handle_booking_event(data, None, None),
            ServerEvent::BookingStarted(data) => {
                self.handle_booking_event(data, Some(BookingStatus::InProgress), None)
            }
            ServerEvent::BookingCompleted(data) => {
                self.handle_booking_event(data, Some(BookingStatus::Completed), None)
            }
            ServerEvent::BookingCancelled(data) => {
                self.handle_booking_event(data, Some(BookingStatus::Cancelled), None)
            }
            ServerEvent::BookingUpdated(data) => self.handle_booking_event(data, None, None),

            ServerEvent::WorkerLocation(data) => {
                if !self.matches(Some(&data.booking_id)) {
                    return;
                }
                let sample = data.to_sample();
                // High-frequency stream: store the copy, let the poll
                // reconcile. No per-ping refetch.
                self.mutate(|view| view.worker_location = Some(sample));
            }

            ServerEvent::TrackingStarted(data)
            | ServerEvent::NavigationStarted(data)
            | ServerEvent::NavigationArrived(data)
            | ServerEvent::NavigationEnded(data) => {
                if let Some(seed) = NavStatus::for_channel(event.channel()) {
                    self.handle_navigation(data, seed);
                }
            }

            ServerEvent::WorkStarted(data) => {
                if !self.matches(Some(&data.booking_id)) {
                    return;
                }
                let start = data.effective_start().unwrap_or_else(chrono::Utc::now);
                self.mutate(|view| {
                    view.work_status = view.work_status.advance(WorkStatus::InProgress);
                    view.status = BookingStatus::InProgress;
                    if view.work_start_time.is_none() {
                        view.work_start_time = Some(start);
                    }
                });
                if self.current_work_status() == WorkStatus::InProgress {
                    self.start_work_ticker();
                }
                self.schedule_refetch();
            }

            ServerEvent::WorkCompleted(data) => {
                if !self.matches(Some(&data.booking_id)) {
                    return;
                }
                // A name on the event is the weakest source; only keep
                // it when nothing better exists.
                if let Some(name) = &data.worker_name {
                    let mut worker = self.worker.lock().expect("tracker state poisoned");
                    if worker.is_none() {
                        *worker = Some(WorkerProfile {
                            name: Some(name.clone()),
                            ..Default::default()
                        });
                    }
                }
                let method = data
                    .payment_method
                    .clone()
                    .or_else(|| self.payment_method.lock().expect("tracker state poisoned").clone());
                let flow = completion_flow(method.as_deref());
                tracing::info!(booking_id = %data.booking_id, ?flow, "Work completed");

                self.mutate(|view| {
                    view.work_status = view.work_status.advance(WorkStatus::Completed);
                    view.status = BookingStatus::Completed;
                    view.completion = Some(flow);
                });
                self.stop_work_ticker();
                self.schedule_refetch();
            }

            // Session/notification events are not booking-scoped.
            _ => {}
        }
    }

    fn handle_booking_event(
        self: &Arc<Self>,
        data: &BookingEventData,
        implied: Option<BookingStatus>,
        nav_seed: Option<NavStatus>,
    ) {
        if !self.matches(data.booking_id()) {
            return;
        }
        self.capture_worker_sources(data.worker.clone(), data.worker_id.clone());
        if let Some(method) = data.payment_method.clone() {
            *self.payment_method.lock().expect("tracker state poisoned") = Some(method);
        }

        let status = data
            .status
            .as_deref()
            .and_then(|s| BookingStatus::parse(s).ok())
            .or(implied);

        self.mutate(|view| {
            if let Some(status) = status {
                view.status = status;
            }
            if let Some(seed) = nav_seed {
                view.nav_status = view.nav_status.advance(seed);
            }
        });

        if matches!(
            status,
            Some(BookingStatus::Completed | BookingStatus::Cancelled)
        ) {
            self.stop_work_ticker();
        }
        self.schedule_refetch();
    }

    fn handle_navigation(self: &Arc<Self>, data: &NavigationEventData, seed: NavStatus) {
        if !self.matches(Some(&data.booking_id)) {
            return;
        }
        let precedence = self.config.eta_precedence;
        self.mutate(|view| {
            view.nav_status = view.nav_status.advance(seed);
            if let Some(distance_m) = data.distance {
                view.distance_km = distance_m / 1000.0;
                let duration = data.duration.filter(|d| *d > 0.0).map(|d| d as u32);
                view.eta_minutes = eta_minutes(precedence, duration, view.distance_km);
            }
        });
        self.schedule_refetch();
    }

    fn matches(&self, booking_id: Option<&str>) -> bool {
        booking_id == Some(self.booking_id.as_str())
    }

    fn current_work_status(&self) -> WorkStatus {
        self.view.lock().expect("tracker state poisoned").work_status
    }

    /// Apply a targeted mutation, re-resolve the worker display fields,
    /// and publish the new snapshot.
    fn mutate(&self, f: impl FnOnce(&mut BookingView)) {
        let snapshot = {
            let mut view = self.view.lock().expect("tracker state poisoned");
            f(&mut view);
            self.refresh_worker_display(&mut view);
            view.clone()
        };
        let _ = self.view_tx.send(snapshot);
    }

    fn refresh_worker_display(&self, view: &mut BookingView) {
        let worker = self.worker.lock().expect("tracker state poisoned").clone();
        let worker_ref = self.worker_ref.lock().expect("tracker state poisoned").clone();
        let fetched = self.fetched_worker.lock().expect("tracker state poisoned").clone();

        view.worker_name = resolve_worker_name(
            worker.as_ref(),
            worker_ref.as_ref(),
            fetched.as_ref(),
            view.status,
        );
        view.worker_phone = resolve_worker_phone(worker.as_ref(), worker_ref.as_ref(), fetched.as_ref());
        view.worker_photo = resolve_worker_photo(worker.as_ref(), worker_ref.as_ref(), fetched.as_ref());
    }

    fn capture_worker_sources(
        self: &Arc<Self>,
        worker: Option<WorkerProfile>,
        worker_ref: Option<WorkerRef>,
    ) {
        if let Some(worker) = worker {
            *self.worker.lock().expect("tracker state poisoned") = Some(worker);
        }
        if let Some(worker_ref) = worker_ref {
            *self.worker_ref.lock().expect("tracker state poisoned") = Some(worker_ref);
        }
        self.maybe_fetch_worker();
    }

    /// When the only lead on the worker is a bare id, fetch the profile
    /// once so the display precedence has a last-resort source.
    fn maybe_fetch_worker(self: &Arc<Self>) {
        let worker_id = {
            let worker = self.worker.lock().expect("tracker state poisoned");
            let worker_ref = self.worker_ref.lock().expect("tracker state poisoned");
            if worker.is_some() {
                return;
            }
            match &*worker_ref {
                Some(WorkerRef::Id(id)) => id.clone(),
                _ => return,
            }
        };
        if self.worker_fetch_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {}
                result = inner.api.get_worker(&worker_id) => match result {
                    Ok(profile) => {
                        *inner.fetched_worker.lock().expect("tracker state poisoned") = Some(profile);
                        inner.mutate(|_| {});
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, worker_id = %worker_id, "Worker profile fetch failed");
                    }
                }
            }
        });
    }

    // ---- reconciliation backstop ----

    /// Debounced authoritative refetch; a newer event supersedes a
    /// pending one.
    fn schedule_refetch(self: &Arc<Self>) {
        let generation = self.refetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = tokio::time::sleep(inner.config.refetch_debounce) => {}
            }
            if inner.refetch_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            inner.refetch().await;
        });
    }

    async fn refetch(self: &Arc<Self>) {
        match self.api.get_booking(&self.booking_id).await {
            Ok(record) => self.apply_authoritative(record),
            Err(e) => {
                // Keep the last known state; the next event or poll
                // retries.
                tracing::warn!(
                    error = %e,
                    booking_id = %self.booking_id,
                    "Booking refetch failed, keeping last known state"
                );
            }
        }
    }

    fn apply_authoritative(self: &Arc<Self>, record: BookingRecord) {
        if record.id != self.booking_id {
            tracing::warn!(got = %record.id, "Refetch returned a different booking, ignoring");
            return;
        }
        self.capture_worker_sources(record.worker, record.worker_id);
        if let Some(method) = record.payment_method {
            *self.payment_method.lock().expect("tracker state poisoned") = Some(method);
        }

        let status = record.status.as_deref().and_then(|s| {
            BookingStatus::parse(s)
                .map_err(|e| tracing::warn!(error = %e, "Refetch carried an unknown status"))
                .ok()
        });

        self.mutate(|view| {
            if let Some(status) = status {
                // The server value is authoritative in both directions.
                view.status = status;
                match status {
                    BookingStatus::Accepted | BookingStatus::InProgress => {
                        view.nav_status = view.nav_status.advance(NavStatus::Accepted);
                    }
                    BookingStatus::Completed => {
                        view.work_status = view.work_status.advance(WorkStatus::Completed);
                    }
                    _ => {}
                }
            }
        });

        if self.current_work_status() != WorkStatus::InProgress {
            self.stop_work_ticker();
        }
    }

    // ---- work duration ticker ----

    fn start_work_ticker(self: &Arc<Self>) {
        let token = {
            let mut ticker = self.ticker.lock().expect("tracker state poisoned");
            if ticker.is_some() {
                return;
            }
            let token = self.cancel.child_token();
            *ticker = Some(token.clone());
            token
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = interval.tick() => {
                        let snapshot = {
                            let mut view = inner.view.lock().expect("tracker state poisoned");
                            if view.work_status != WorkStatus::InProgress {
                                None
                            } else {
                                if let Some(start) = view.work_start_time {
                                    view.work_duration_secs = chrono::Utc::now()
                                        .signed_duration_since(start)
                                        .num_seconds()
                                        .max(0) as u64;
                                }
                                Some(view.clone())
                            }
                        };
                        match snapshot {
                            Some(view) => {
                                let _ = inner.view_tx.send(view);
                            }
                            None => {
                                inner.stop_work_ticker();
                                return;
                            }
                        }
                    }
                }
            }
        });
    }

    fn stop_work_ticker(&self) {
        if let Some(token) = self.ticker.lock().expect("tracker state poisoned").take() {
            token.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sajilo_realtime::messages::parse_event;
    use sajilo_realtime::{SocketConfig, SocketManager};

    use super::*;

    fn test_setup() -> (Arc<BookingApi>, Arc<SocketManager>) {
        // The API endpoint is unroutable: refetches fail fast and the
        // tracker must keep its optimistic state.
        let api = Arc::new(BookingApi::new("http://127.0.0.1:1"));
        let manager = SocketManager::start(SocketConfig::new("ws://127.0.0.1:1"));
        (api, manager)
    }

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            refetch_debounce: Duration::from_millis(20),
            poll_interval: Duration::from_secs(30),
            eta_precedence: EtaPrecedence::ProviderDuration,
        }
    }

    fn dispatch(manager: &SocketManager, json: &str) {
        manager.router().dispatch(&parse_event(json).unwrap());
    }

    #[tokio::test]
    async fn accepted_event_updates_status_nav_and_worker() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        dispatch(
            &manager,
            r#"{"event":"booking:accepted","data":{"_id":"b1","status":"accepted","worker":{"firstName":"Sita","lastName":"Rai","phone":"9841000000"}}}"#,
        );

        let view = tracker.view();
        assert_eq!(view.status, BookingStatus::Accepted);
        assert_eq!(view.nav_status, NavStatus::Accepted);
        assert_eq!(view.worker_name, "Sita Rai");
        assert_eq!(view.worker_phone.as_deref(), Some("9841000000"));

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn out_of_order_navigation_events_never_regress() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        dispatch(
            &manager,
            r#"{"event":"navigation:arrived","data":{"bookingId":"b1","workerId":"w1"}}"#,
        );
        assert_eq!(tracker.view().nav_status, NavStatus::Arrived);

        // The late-delivered earlier stage must not win.
        dispatch(
            &manager,
            r#"{"event":"navigation:started","data":{"bookingId":"b1","workerId":"w1"}}"#,
        );
        assert_eq!(tracker.view().nav_status, NavStatus::Arrived);

        dispatch(
            &manager,
            r#"{"event":"navigation:ended","data":{"bookingId":"b1","workerId":"w1"}}"#,
        );
        dispatch(
            &manager,
            r#"{"event":"location:tracking:started","data":{"bookingId":"b1","workerId":"w1"}}"#,
        );
        assert_eq!(tracker.view().nav_status, NavStatus::Ended);

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn events_for_other_bookings_are_ignored() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        dispatch(
            &manager,
            r#"{"event":"booking:cancelled","data":{"bookingId":"b2"}}"#,
        );
        dispatch(
            &manager,
            r#"{"event":"worker:location","data":{"workerId":"w1","bookingId":"b2","latitude":27.7,"longitude":85.3}}"#,
        );

        let view = tracker.view();
        assert_eq!(view.status, BookingStatus::Pending);
        assert!(view.worker_location.is_none());

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn worker_location_is_copied_into_the_view() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        dispatch(
            &manager,
            r#"{"event":"worker:location","data":{"workerId":"w1","bookingId":"b1","latitude":27.7172,"longitude":85.324,"accuracy":8.0}}"#,
        );

        let location = tracker.view().worker_location.expect("location stored");
        assert_eq!(location.latitude, 27.7172);
        assert_eq!(location.accuracy, Some(8.0));

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn work_lifecycle_runs_and_stops_the_duration_ticker() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        let start = (chrono::Utc::now() - chrono::Duration::seconds(90)).to_rfc3339();
        dispatch(
            &manager,
            &format!(
                r#"{{"event":"work:started","data":{{"bookingId":"b1","startTime":"{start}"}}}}"#
            ),
        );
        assert_eq!(tracker.view().work_status, WorkStatus::InProgress);

        // Give the 1 s ticker time to fire at least once.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        let view = tracker.view();
        assert!(view.work_duration_secs >= 90, "got {}", view.work_duration_secs);

        dispatch(
            &manager,
            r#"{"event":"work:completed","data":{"bookingId":"b1","paymentMethod":"cash"}}"#,
        );
        let view = tracker.view();
        assert_eq!(view.work_status, WorkStatus::Completed);
        assert_eq!(view.status, BookingStatus::Completed);
        assert_eq!(
            view.completion,
            Some(sajilo_core::CompletionFlow::CashConfirmation)
        );

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn completion_flow_branches_on_payment_method() {
        for (method_json, expected) in [
            (
                r#","paymentMethod":"online""#,
                sajilo_core::CompletionFlow::PaymentOptions,
            ),
            ("", sajilo_core::CompletionFlow::DirectReview),
        ] {
            let (api, manager) = test_setup();
            let tracker =
                BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

            dispatch(
                &manager,
                &format!(r#"{{"event":"work:completed","data":{{"bookingId":"b1"{method_json}}}}}"#),
            );
            assert_eq!(tracker.view().completion, Some(expected));

            tracker.stop();
            manager.shutdown();
        }
    }

    #[tokio::test]
    async fn navigation_started_distance_feeds_the_eta() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        dispatch(
            &manager,
            r#"{"event":"navigation:started","data":{"bookingId":"b1","distance":5100.0,"duration":360.0}}"#,
        );

        let view = tracker.view();
        assert_eq!(view.nav_status, NavStatus::Navigating);
        assert_eq!(view.distance_km, 5.1);
        // ProviderDuration precedence: 360 s -> 6 min.
        assert_eq!(view.eta_minutes, 6);

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn route_results_respect_the_eta_precedence() {
        let route = RouteResult {
            coordinates: vec![(27.7, 85.3), (27.68, 85.28)],
            distance_m: 5100.0,
            duration_secs: 360.0,
            geometry: None,
        };

        let (api, manager) = test_setup();
        let provider_first =
            BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");
        provider_first.apply_route(&route);
        assert_eq!(provider_first.view().eta_minutes, 6);
        provider_first.stop();

        let mut heuristic_config = fast_config();
        heuristic_config.eta_precedence = EtaPrecedence::DistanceHeuristic;
        let (api, manager2) = test_setup();
        let heuristic_first =
            BookingTracker::start(api, Arc::clone(&manager2), heuristic_config, "b1");
        heuristic_first.apply_route(&route);
        // ceil(5.1 * 2) = 11, even though a provider duration exists.
        assert_eq!(heuristic_first.view().eta_minutes, 11);
        heuristic_first.stop();

        manager.shutdown();
        manager2.shutdown();
    }

    #[tokio::test]
    async fn straight_line_fallback_routes_use_the_heuristic() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        // Fallback routes carry duration 0 -> the heuristic applies
        // even under ProviderDuration precedence.
        tracker.apply_route(&RouteResult {
            coordinates: vec![(27.7, 85.3), (27.68, 85.28)],
            distance_m: 5000.0,
            duration_secs: 0.0,
            geometry: None,
        });
        assert_eq!(tracker.view().eta_minutes, 10);

        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn stop_removes_subscriptions_and_freezes_the_view() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");
        tracker.stop();

        assert_eq!(
            manager.router().subscriber_count(channels::BOOKING_ACCEPTED),
            0
        );

        dispatch(
            &manager,
            r#"{"event":"booking:accepted","data":{"_id":"b1","status":"accepted"}}"#,
        );
        assert_eq!(tracker.view().status, BookingStatus::Pending);

        // Second stop is a no-op.
        tracker.stop();
        manager.shutdown();
    }

    #[tokio::test]
    async fn duplicate_events_are_idempotent() {
        let (api, manager) = test_setup();
        let tracker = BookingTracker::start(api, Arc::clone(&manager), fast_config(), "b1");

        for _ in 0..3 {
            dispatch(
                &manager,
                r#"{"event":"booking:accepted","data":{"_id":"b1","status":"accepted"}}"#,
            );
        }
        let view = tracker.view();
        assert_eq!(view.status, BookingStatus::Accepted);
        assert_eq!(view.nav_status, NavStatus::Accepted);

        tracker.stop();
        manager.shutdown();
    }
}
