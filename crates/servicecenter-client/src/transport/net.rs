//! Network connector: HTTP exchanges through `reqwest`, WebSocket upgrades
//! through `async-tungstenite`
//!
//! The HTTP client keeps no idle connections, so every exchange opens a fresh
//! one and nothing pooled can go stale across endpoint failover.

use super::{Connector, EventStream, HttpRequest, Response};
use crate::error::{Error, Result};
use crate::tls::TlsClientConfig;
use async_trait::async_trait;
use async_tungstenite::client_async;
use async_tungstenite::tungstenite::client::IntoClientRequest;
use async_tungstenite::tungstenite::http::HeaderMap;
use futures::StreamExt;
use futures_rustls::client::TlsStream;
use rustls::pki_types::ServerName;
use std::io;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use url::Url;

/// Connector over real sockets with certificate verification disabled
#[derive(Debug, Clone)]
pub struct NetConnector {
    http: reqwest::Client,
    tls: TlsClientConfig,
}

enum Conn {
    Plain(Compat<TcpStream>),
    Tls(Box<TlsStream<Compat<TcpStream>>>),
}

impl NetConnector {
    /// Connector with certificate verification disabled
    pub fn new() -> Result<Self> {
        Self::with_tls(TlsClientConfig::insecure()?)
    }

    /// Connector with a custom TLS configuration for stream upgrades
    pub fn with_tls(tls: TlsClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Config(format!("build HTTP client: {}", e)))?;
        Ok(Self { http, tls })
    }

    async fn connect(&self, url: &Url) -> io::Result<Conn> {
        let host = url
            .host_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "url has no host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "url has no port"))?;

        let tcp = TcpStream::connect((host.as_str(), port)).await?.compat();

        match url.scheme() {
            "https" | "wss" => {
                let server_name = ServerName::try_from(host)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let tls = self.tls.connector().connect(server_name, tcp).await?;
                Ok(Conn::Tls(Box::new(tls)))
            }
            _ => Ok(Conn::Plain(tcp)),
        }
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn send(&self, request: HttpRequest) -> Result<Response> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let fail = |e: reqwest::Error| Error::transport(&method, &url, e);

        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let reply = builder.send().await.map_err(fail)?;
        let status = reply.status();
        let headers = reply.headers().clone();
        let body = reply.bytes().await.map_err(fail)?;

        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn dial(&self, url: Url, headers: HeaderMap) -> Result<EventStream> {
        let fail = |reason: String| Error::transport("GET", &url, reason);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| fail(e.to_string()))?;
        request.headers_mut().extend(headers);

        let conn = self.connect(&url).await.map_err(|e| fail(e.to_string()))?;
        let stream: EventStream = match conn {
            Conn::Plain(tcp) => {
                let (ws, _) = client_async(request, tcp)
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                ws.map(|msg| msg.map_err(Error::from)).boxed()
            }
            Conn::Tls(tls) => {
                let (ws, _) = client_async(request, tls)
                    .await
                    .map_err(|e| fail(e.to_string()))?;
                ws.map(|msg| msg.map_err(Error::from)).boxed()
            }
        };

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_tungstenite::tungstenite::http::{HeaderValue, Method, StatusCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_forwards_method_headers_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&seen).ends_with("{}") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 4\r\n\r\ndone")
                .await
                .unwrap();
            String::from_utf8_lossy(&seen).to_lowercase()
        });

        let mut headers = HeaderMap::new();
        headers.insert("x-domain-name", HeaderValue::from_static("default"));
        let request = HttpRequest {
            method: Method::PUT,
            url: Url::parse(&format!("http://{}/registry/v3/heartbeats?x=1", addr)).unwrap(),
            headers,
            body: Some(b"{}".to_vec()),
        };

        let connector = NetConnector::new().unwrap();
        let response = connector.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body_text(), "done");

        let head = server.await.unwrap();
        assert!(head.starts_with("put /registry/v3/heartbeats?x=1 http/1.1\r\n"));
        assert!(head.contains("x-domain-name: default\r\n"));
        assert!(head.contains("content-length: 2\r\n"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = NetConnector::new().unwrap();
        let request = HttpRequest {
            method: Method::GET,
            url: Url::parse(&format!("http://{}/", addr)).unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };
        let err = connector.send(request).await.unwrap_err();
        assert!(err.is_transport());

        let url = Url::parse(&format!("ws://{}/watcher", addr)).unwrap();
        assert!(connector.dial(url, HeaderMap::new()).await.err().expect("dial should fail").is_transport());
    }
}
