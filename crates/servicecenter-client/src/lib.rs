//! Client for a ServiceComb-style service center
//!
//! This crate lets a service register itself with a central registry, keep
//! its instance alive with heartbeats, discover the instances of the
//! providers it calls and follow their membership changes over a WebSocket
//! watch stream.
//!
//! # Architecture
//!
//! - [`RoundRobin`] picks the next registry endpoint without locks
//! - [`Transport`] retries one call across every endpoint on transport
//!   failure and upgrades to WebSocket for watches
//! - [`RegistryClient`] speaks the registry's v3 HTTP API
//! - [`ProviderCache`] mirrors discovered providers, spliced by watch events
//! - [`RegistrationSession`] and [`WatchSession`] run the heartbeat and watch
//!   loops as joinable tasks bound to a [`CancellationToken`]
//! - [`ServiceCenter`] ties it together as one explicit context object
//!
//! HTTP calls go through `reqwest` and watches through `async-tungstenite`;
//! background tasks run on tokio and stop through `tokio-util`'s
//! [`CancellationToken`].
//!
//! # Example
//!
//! ```no_run
//! use servicecenter_client::{CancellationToken, Config, ServiceCenter};
//!
//! # async fn example() -> servicecenter_client::Result<()> {
//! let config = Config::from_file("conf/microservice.yaml")?;
//! let center = ServiceCenter::from_config(&config)?;
//!
//! let shutdown = CancellationToken::new();
//! let mut session = center.registration();
//! // Registers, heartbeats until `shutdown` is cancelled, then unregisters
//! session.run(&shutdown).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod selector;
pub mod session;
pub mod tls;
pub mod transport;

pub use cache::{ApplyOutcome, ProviderCache};
pub use client::RegistryClient;
pub use config::{
    Config, InstanceConfig, ProviderConfig, RegistryConfig, ServiceConfig, Settings, Tenant,
};
pub use context::ServiceCenter;
pub use error::{Error, Result};
pub use models::*;
pub use selector::RoundRobin;
pub use session::{
    HeartbeatExit, HeartbeatReport, Registration, RegistrationSession, RegistrationState,
    WatchSession,
};
pub use tls::TlsClientConfig;
pub use transport::{Body, Connector, Decode, NetConnector, Response, Transport};

/// Cancellation shared by sessions and their callers
pub use tokio_util::sync::CancellationToken;

/// HTTP types used across the transport API
pub use async_tungstenite::tungstenite::http;

/// Re-export key types for convenience
pub mod prelude {
    pub use crate::{
        CancellationToken,
        Config,
        Error,
        MicroService,
        MicroServiceInstance,
        ProviderCache,
        RegistrationSession,
        RegistryClient,
        Result,
        ServiceCenter,
        Transport,
        WatchSession,
    };
}
