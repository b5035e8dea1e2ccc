//! Location and route engine.
//!
//! Converts raw position updates into a rate-limited stream of route
//! results: a [`DirectionsProvider`] supplies traffic-aware polylines,
//! [`RouteEngine`] throttles recomputation and degrades to a
//! straight-line estimate when the provider fails.

pub mod directions;
pub mod engine;

pub use directions::{
    DirectionsError, DirectionsProvider, MapboxDirections, RouteResult, RoutingProfile,
};
pub use engine::RouteEngine;
