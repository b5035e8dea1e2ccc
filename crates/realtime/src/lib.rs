//! Realtime socket layer: session management, event routing, and the
//! worker-side booking request listener.
//!
//! - [`SocketManager`] — one authenticated WebSocket session per
//!   process, with exponential-backoff reconnection and automatic
//!   re-authentication.
//! - [`EventRouter`] — ordered per-channel callback fan-out shared by
//!   every consumer of the session.
//! - [`ServerEvent`] / [`ClientAction`] — the typed wire contract.
//! - [`BookingRequestListener`] — reconnect-safe job offer delivery for
//!   worker clients.

pub mod listener;
pub mod messages;
pub mod reconnect;
pub mod router;
pub mod socket;

pub use listener::BookingRequestListener;
pub use messages::{ClientAction, Role, ServerEvent, WorkerPresence};
pub use reconnect::ReconnectConfig;
pub use router::{EventRouter, SubscriptionId};
pub use socket::{ConnectionStatus, SocketConfig, SocketManager};
