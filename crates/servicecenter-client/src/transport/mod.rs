//! Failover-aware HTTP and stream transport
//!
//! A [`Transport`] owns a [`RoundRobin`] selector and a [`Connector`]. Each
//! logical call makes at most one attempt per configured endpoint, moving on
//! only when an attempt fails at the transport level. Any HTTP response,
//! whatever its status, ends the loop; interpreting the status is up to the
//! caller (see [`Response::parse`]).

mod net;
mod response;

pub use net::NetConnector;
pub use response::{Body, Decode, Response};

use crate::error::{Error, Result};
use crate::selector::RoundRobin;
use async_trait::async_trait;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::tungstenite::http::{HeaderMap, Method};
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Inbound frames of an upgraded stream connection
pub type EventStream = BoxStream<'static, Result<Message>>;

/// One HTTP request against one concrete URL
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional body
    pub body: Option<Vec<u8>>,
}

/// Performs single network exchanges; failures must be [`Error::Transport`]
/// for the caller to try the next endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Issue one request and buffer the whole response
    async fn send(&self, request: HttpRequest) -> Result<Response>;

    /// Open a persistent stream connection to a `ws`/`wss` URL
    async fn dial(&self, url: Url, headers: HeaderMap) -> Result<EventStream>;
}

/// Round-robin, retrying client over a fixed endpoint set
#[derive(Clone)]
pub struct Transport {
    selector: Arc<RoundRobin>,
    connector: Arc<dyn Connector>,
}

impl Transport {
    /// Transport over real sockets
    pub fn new<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::with_connector(endpoints, Arc::new(NetConnector::new()?)))
    }

    /// Transport over a custom connector
    pub fn with_connector<I, S>(endpoints: I, connector: Arc<dyn Connector>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selector: Arc::new(RoundRobin::new(endpoints)),
            connector,
        }
    }

    /// Configured endpoints
    pub fn endpoints(&self) -> &[String] {
        self.selector.endpoints()
    }

    /// Issue `method path` against the next endpoints until one answers
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let mut last_err = Error::NoEndpoint;

        for _ in 0..self.selector.len() {
            let Some(endpoint) = self.selector.next() else {
                break;
            };
            let address = join(endpoint, path);
            let url = match Url::parse(&address) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Parse request url {} failed: {}", address, e);
                    last_err = Error::transport(&method, &address, e);
                    continue;
                }
            };

            debug!("{} {}", method, url);
            let request = HttpRequest {
                method: method.clone(),
                url,
                headers: headers.clone(),
                body: body.clone(),
            };

            match self.connector.send(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transport() => {
                    warn!("{} request to {} failed: {}", method, address, e);
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// Upgrade to a stream connection on the next endpoints until one accepts.
    ///
    /// `http` endpoints are dialed as `ws`, `https` as `wss`.
    pub async fn stream_dial(&self, path: &str, headers: &HeaderMap) -> Result<EventStream> {
        let mut last_err = Error::NoEndpoint;

        for _ in 0..self.selector.len() {
            let Some(endpoint) = self.selector.next() else {
                break;
            };
            let address = join(endpoint, path);
            let url = match stream_url(&address) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Parse stream dial url {} failed: {}", address, e);
                    last_err = e;
                    continue;
                }
            };

            match self.connector.dial(url, headers.clone()).await {
                Ok(stream) => {
                    debug!("Stream connected to {}", address);
                    return Ok(stream);
                }
                Err(e) if e.is_transport() => {
                    warn!("Stream dial to {} failed: {}", address, e);
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }
}

fn join(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

fn stream_url(address: &str) -> Result<Url> {
    let mut url = Url::parse(address).map_err(|e| Error::transport(Method::GET, address, e))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| {
        let reason = format!("cannot dial {} as {}", url.scheme(), scheme);
        Error::transport(Method::GET, address, reason)
    })?;
    Ok(url)
}
