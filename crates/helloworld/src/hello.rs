//! The provider's `/hello` endpoint
//!
//! HTTP/1 through hyper with `TokioIo`, one spawned task per connection.

use anyhow::Result;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use servicecenter_client::CancellationToken;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Listener answering `GET /hello`
pub struct HelloServer {
    listener: TcpListener,
}

impl HelloServer {
    /// Bind to `host:port`
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `token` fires
    pub async fn serve(self, token: CancellationToken) {
        info!("Serving /hello on {:?}", self.listener.local_addr());

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(handle);
                            let served = http1::Builder::new().serve_connection(io, service);
                            if let Err(e) = served.await {
                                debug!("Connection from {} failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                }
            }
        }
        info!("Hello listener stopped");
    }
}

async fn handle(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, body) = route(req.method(), req.uri().path());

    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    Ok(response)
}

fn route(method: &Method, path: &str) -> (StatusCode, &'static str) {
    match (method, path) {
        (&Method::GET, "/hello") => (StatusCode::OK, "hello world"),
        _ => (StatusCode::NOT_FOUND, "not found"),
    }
}
