//! Long-running sessions bound to a cancellation token
//!
//! - [`RegistrationSession`] owns the local service and instance records and
//!   keeps them alive with heartbeats.
//! - [`WatchSession`] mirrors one provider's membership into the
//!   [`ProviderCache`](crate::cache::ProviderCache).
//!
//! Both run their loop as a spawned tokio task and join it on shutdown.

mod registration;
mod watch;

pub use registration::{
    HeartbeatExit, HeartbeatReport, Registration, RegistrationSession, RegistrationState,
    heartbeat_loop,
};
pub use watch::WatchSession;
