//! Error types for the service center client

use thiserror::Error;

/// Service center client error type
#[derive(Error, Debug)]
pub enum Error {
    /// The endpoint set is empty, nothing was attempted
    #[error("No endpoint available")]
    NoEndpoint,

    /// Connect, DNS, TLS or I/O failure while talking to one endpoint
    #[error("{method} request to {url} failed: {reason}")]
    Transport {
        /// HTTP method (or `GET` for stream upgrades)
        method: String,
        /// Full request URL
        url: String,
        /// What went wrong
        reason: String,
    },

    /// The registry answered with a status code the caller did not expect
    #[error("Do request failed, response status code: {status}, body: {body}")]
    UnexpectedStatus {
        /// Actual status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The body arrived with the expected status but could not be decoded
    #[error("Parse response body: \"{body}\" failed: {reason}")]
    Decode {
        /// Raw response body
        body: String,
        /// Decoder error
        reason: String,
    },

    /// Discovery returned no instance for the provider
    #[error("Provider not found, serviceName: {name} appId: {app_id}, version: {version}")]
    ProviderNotFound {
        /// Provider application id
        app_id: String,
        /// Provider service name
        name: String,
        /// Requested version rule
        version: String,
    },

    /// Nothing cached for the provider service id
    #[error("Provider \"{0}\" not found in cache")]
    ProviderNotCached(String),

    /// Heartbeats need a registered instance
    #[error("Service {0} has no registered instance")]
    NoInstance(String),

    /// The watch stream ended without being cancelled
    #[error("Watch stream closed by registry")]
    WatchClosed,

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A background task ended abnormally
    #[error("Task error: {0}")]
    Task(String),
}

impl Error {
    /// Whether the failure is worth retrying against another endpoint
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    pub(crate) fn transport(
        method: impl ToString,
        url: impl ToString,
        reason: impl ToString,
    ) -> Self {
        Error::Transport {
            method: method.to_string(),
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
