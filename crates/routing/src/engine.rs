//! Throttled route recomputation.
//!
//! [`RouteEngine`] turns a stream of raw position updates into a
//! rate-limited stream of [`RouteResult`]s. Position samples are stored
//! the moment they arrive (the UI always sees the freshest raw fix),
//! but actual provider calls are gated to one per update interval, with
//! an in-flight guard so a slow provider call is never stacked behind
//! another. When the provider fails, the engine degrades to a synthetic
//! two-point straight route instead of dropping the update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use sajilo_core::geo::haversine_m;
use sajilo_core::types::LocationSample;

use crate::directions::{DirectionsProvider, RouteResult, RoutingProfile};

/// Update interval bounds. Anything outside is clamped.
const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(3);
const MAX_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

type RouteCallback = Arc<dyn Fn(&RouteResult) + Send + Sync>;

/// Periodic route/ETA recomputation between a moving origin and a
/// destination.
pub struct RouteEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    provider: Arc<dyn DirectionsProvider>,
    profile: RoutingProfile,
    origin: Mutex<Option<LocationSample>>,
    destination: Mutex<Option<LocationSample>>,
    /// Gate for throttled recomputes; `None` until the first one.
    last_update: Mutex<Option<Instant>>,
    interval: Mutex<Duration>,
    /// A recompute is running; ticks arriving now are dropped.
    in_flight: AtomicBool,
    callbacks: Mutex<Vec<RouteCallback>>,
    active: Mutex<Option<CancellationToken>>,
}

impl RouteEngine {
    pub fn new(provider: Arc<dyn DirectionsProvider>, profile: RoutingProfile) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                provider,
                profile,
                origin: Mutex::new(None),
                destination: Mutex::new(None),
                last_update: Mutex::new(None),
                interval: Mutex::new(MAX_UPDATE_INTERVAL),
                in_flight: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
                active: Mutex::new(None),
            }),
        }
    }

    /// Go `Idle → Active`: store the endpoints, register the callback,
    /// and start the periodic recompute timer. Calling again restarts
    /// the cycle with the new parameters.
    pub fn start_map_updates(
        &self,
        origin: LocationSample,
        destination: LocationSample,
        interval: Duration,
        callback: impl Fn(&RouteResult) + Send + Sync + 'static,
    ) {
        self.stop_map_updates();

        let interval = interval.clamp(MIN_UPDATE_INTERVAL, MAX_UPDATE_INTERVAL);
        *self.inner.interval.lock().expect("engine state poisoned") = interval;
        *self.inner.origin.lock().expect("engine state poisoned") = Some(origin);
        *self.inner.destination.lock().expect("engine state poisoned") = Some(destination);
        self.inner
            .callbacks
            .lock()
            .expect("engine state poisoned")
            .push(Arc::new(callback));

        let cancel = CancellationToken::new();
        *self.inner.active.lock().expect("engine state poisoned") = Some(cancel.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Route update timer stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        perform_update(Arc::clone(&inner)).await;
                    }
                }
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "Map updates started");
    }

    /// Go `Active → Idle`: stop the timer and clear the callback list,
    /// so an in-flight provider call resolves into nothing. Safe to
    /// call at any time.
    pub fn stop_map_updates(&self) {
        if let Some(cancel) = self.inner.active.lock().expect("engine state poisoned").take() {
            cancel.cancel();
        }
        self.inner.callbacks.lock().expect("engine state poisoned").clear();
        *self.inner.last_update.lock().expect("engine state poisoned") = None;
    }

    /// Store the latest origin fix immediately; recompute the route
    /// only if the update interval has elapsed since the last one.
    pub fn update_origin(&self, sample: LocationSample) {
        *self.inner.origin.lock().expect("engine state poisoned") = Some(sample);
        self.maybe_recompute();
    }

    /// Store the latest destination immediately; recompute the route
    /// only if the update interval has elapsed since the last one.
    pub fn update_destination(&self, sample: LocationSample) {
        *self.inner.destination.lock().expect("engine state poisoned") = Some(sample);
        self.maybe_recompute();
    }

    /// Explicit "refresh now": reset the throttle gate and recompute
    /// unconditionally (the in-flight guard still applies).
    pub fn force_route_update(&self, origin: LocationSample, destination: LocationSample) {
        *self.inner.origin.lock().expect("engine state poisoned") = Some(origin);
        *self.inner.destination.lock().expect("engine state poisoned") = Some(destination);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            perform_update(inner).await;
        });
    }

    /// The freshest raw origin fix, independent of route recomputes.
    pub fn latest_origin(&self) -> Option<LocationSample> {
        self.inner.origin.lock().expect("engine state poisoned").clone()
    }

    pub fn latest_destination(&self) -> Option<LocationSample> {
        self.inner.destination.lock().expect("engine state poisoned").clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.lock().expect("engine state poisoned").is_some()
    }

    fn maybe_recompute(&self) {
        if !self.is_active() {
            return;
        }
        let elapsed_enough = {
            let last = self.inner.last_update.lock().expect("engine state poisoned");
            let interval = *self.inner.interval.lock().expect("engine state poisoned");
            last.map(|at| at.elapsed() >= interval).unwrap_or(true)
        };
        if !elapsed_enough {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            perform_update(inner).await;
        });
    }
}

/// One recompute step: mutually exclusive via the in-flight flag.
async fn perform_update(inner: Arc<EngineInner>) {
    if inner.in_flight.swap(true, Ordering::AcqRel) {
        tracing::trace!("Dropping route tick, previous computation still running");
        return;
    }

    let endpoints = {
        let origin = inner.origin.lock().expect("engine state poisoned").clone();
        let destination = inner.destination.lock().expect("engine state poisoned").clone();
        origin.zip(destination)
    };

    let Some((origin, destination)) = endpoints else {
        inner.in_flight.store(false, Ordering::Release);
        return;
    };

    *inner.last_update.lock().expect("engine state poisoned") = Some(Instant::now());

    let result = inner
        .provider
        .get_directions(
            (origin.longitude, origin.latitude),
            (destination.longitude, destination.latitude),
            inner.profile,
        )
        .await;

    let route = match result {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!(error = %e, "Directions provider failed, using straight-line fallback");
            straight_line_route(&origin, &destination)
        }
    };

    let callbacks: Vec<RouteCallback> = inner
        .callbacks
        .lock()
        .expect("engine state poisoned")
        .iter()
        .map(Arc::clone)
        .collect();
    for callback in &callbacks {
        callback(&route);
    }

    inner.in_flight.store(false, Ordering::Release);
}

/// Synthetic two-point route used when the provider cannot answer.
/// Distance comes from the shared Haversine; duration is unknown.
fn straight_line_route(origin: &LocationSample, destination: &LocationSample) -> RouteResult {
    RouteResult {
        coordinates: vec![
            (origin.latitude, origin.longitude),
            (destination.latitude, destination.longitude),
        ],
        distance_m: haversine_m(
            origin.latitude,
            origin.longitude,
            destination.latitude,
            destination.longitude,
        ),
        duration_secs: 0.0,
        geometry: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::directions::DirectionsError;

    struct StubProvider {
        calls: AtomicU32,
        fail: bool,
        delay: Option<Duration>,
    }

    impl StubProvider {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: false,
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: true,
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: false,
                delay: Some(delay),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectionsProvider for StubProvider {
        async fn get_directions(
            &self,
            origin_lng_lat: (f64, f64),
            dest_lng_lat: (f64, f64),
            _profile: RoutingProfile,
        ) -> Result<RouteResult, DirectionsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(DirectionsError::EmptyRoute);
            }
            Ok(RouteResult {
                coordinates: vec![
                    (origin_lng_lat.1, origin_lng_lat.0),
                    (dest_lng_lat.1, dest_lng_lat.0),
                ],
                distance_m: 2500.0,
                duration_secs: 420.0,
                geometry: None,
            })
        }
    }

    fn sample(lat: f64, lon: f64) -> LocationSample {
        LocationSample::new(lat, lon, 1_700_000_000_000)
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_straight_line() {
        let provider = StubProvider::failing();
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::DrivingTraffic,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let origin = sample(27.7172, 85.3240);
        let destination = sample(27.7000, 85.3000);
        engine.start_map_updates(origin.clone(), destination.clone(), Duration::from_secs(3), {
            move |route: &RouteResult| {
                let _ = tx.send(route.clone());
            }
        });

        let route = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no route callback")
            .unwrap();

        assert_eq!(
            route.coordinates,
            vec![(27.7172, 85.3240), (27.7000, 85.3000)]
        );
        assert!(
            (route.distance_m - 2200.0).abs() < 50.0,
            "got {} m",
            route.distance_m
        );
        assert_eq!(route.duration_secs, 0.0);
        assert!(route.geometry.is_none());

        engine.stop_map_updates();
    }

    #[tokio::test]
    async fn updates_within_the_interval_do_not_recompute() {
        let provider = StubProvider::ok();
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::DrivingTraffic,
        );

        engine.start_map_updates(
            sample(27.70, 85.32),
            sample(27.68, 85.30),
            Duration::from_secs(5),
            |_| {},
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(provider.call_count(), 1, "initial tick only");

        // Samples are stored immediately, but the gate is closed.
        engine.update_origin(sample(27.71, 85.33));
        engine.update_origin(sample(27.72, 85.34));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(engine.latest_origin().unwrap().latitude, 27.72);

        engine.stop_map_updates();
    }

    #[tokio::test]
    async fn force_route_update_bypasses_the_gate() {
        let provider = StubProvider::ok();
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::DrivingTraffic,
        );

        engine.start_map_updates(
            sample(27.70, 85.32),
            sample(27.68, 85.30),
            Duration::from_secs(5),
            |_| {},
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(provider.call_count(), 1);

        engine.force_route_update(sample(27.71, 85.33), sample(27.68, 85.30));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(provider.call_count(), 2);

        engine.stop_map_updates();
    }

    #[tokio::test]
    async fn in_flight_guard_drops_overlapping_recomputes() {
        let provider = StubProvider::slow(Duration::from_millis(300));
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::DrivingTraffic,
        );

        engine.start_map_updates(
            sample(27.70, 85.32),
            sample(27.68, 85.30),
            Duration::from_secs(5),
            |_| {},
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The initial computation is still sleeping inside the stub.
        engine.force_route_update(sample(27.71, 85.33), sample(27.68, 85.30));
        engine.force_route_update(sample(27.72, 85.34), sample(27.68, 85.30));
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(provider.call_count(), 1);
        engine.stop_map_updates();
    }

    #[tokio::test]
    async fn stop_discards_in_flight_results() {
        let provider = StubProvider::slow(Duration::from_millis(150));
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::DrivingTraffic,
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.start_map_updates(
            sample(27.70, 85.32),
            sample(27.68, 85.30),
            Duration::from_secs(5),
            move |route: &RouteResult| {
                let _ = tx.send(route.clone());
            },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.stop_map_updates();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err(), "callback fired after stop");
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn samples_are_stored_even_when_idle() {
        let provider = StubProvider::ok();
        let engine = RouteEngine::new(
            provider.clone() as Arc<dyn DirectionsProvider>,
            RoutingProfile::Driving,
        );

        engine.update_origin(sample(27.70, 85.32));
        engine.update_destination(sample(27.68, 85.30));

        assert_eq!(engine.latest_origin().unwrap().latitude, 27.70);
        assert_eq!(engine.latest_destination().unwrap().longitude, 85.30);
        // Idle: storing samples never dials the provider.
        assert_eq!(provider.call_count(), 0);
    }
}
