//! Registry client for the service center v3 API

use crate::{
    config::Tenant,
    error::{Error, Result},
    models::*,
    transport::Transport,
};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::tungstenite::http::header::CONTENT_TYPE;
use async_tungstenite::tungstenite::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

const API_EXISTENCE: &str = "/registry/v3/existence";
const API_MICROSERVICES: &str = "/registry/v3/microservices";
const API_DISCOVERY_INSTANCES: &str = "/registry/v3/instances";
const API_HEARTBEATS: &str = "/registry/v3/heartbeats";

const MICROSERVICE_TYPE: &str = "microservice";

/// Tenant domain header
pub const HEADER_DOMAIN: &str = "x-domain-name";
/// Tenant project header
pub const HEADER_PROJECT: &str = "x-domain-project";
/// Consumer id header sent on discovery
pub const HEADER_CONSUMER_ID: &str = "x-consumerid";

/// Client for one tenant of the service center
pub struct RegistryClient {
    transport: Transport,
    tenant: Tenant,
    headers: HeaderMap,
}

impl RegistryClient {
    /// Client over real sockets
    pub fn new<I, S>(tenant: Tenant, endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_transport(tenant, Transport::new(endpoints)?)
    }

    /// Client over a prepared transport
    pub fn with_transport(tenant: Tenant, transport: Transport) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(HEADER_DOMAIN, header_value(&tenant.domain)?);
        headers.insert(HEADER_PROJECT, header_value(&tenant.project)?);

        Ok(Self {
            transport,
            tenant,
            headers,
        })
    }

    /// Tenant attached to every call
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Underlying transport
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Look up the id of an already registered service
    pub async fn get_service_id(&self, service: &MicroService) -> Result<Option<String>> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("type", MICROSERVICE_TYPE)
            .append_pair("appId", &service.app_id)
            .append_pair("serviceName", &service.service_name)
            .append_pair("version", &service.version)
            .finish();

        let resp = self
            .transport
            .call(Method::GET, &format!("{}?{}", API_EXISTENCE, query), &self.headers, None)
            .await?;

        // The registry answers "does not exist" with an error status
        if resp.status != StatusCode::OK {
            debug!(
                "Service {}/{}/{} not registered yet: {} {}",
                service.app_id,
                service.service_name,
                service.version,
                resp.status,
                resp.body_text()
            );
            return Ok(None);
        }

        let existence: GetExistenceResponse = resp.json(StatusCode::OK)?;
        Ok(Some(existence.service_id).filter(|id| !id.is_empty()))
    }

    /// Create a service record unconditionally
    pub async fn create_service(&self, service: &MicroService) -> Result<String> {
        let body = serde_json::to_vec(&CreateServiceRequest {
            service: service.clone(),
        })?;

        let created: CreateServiceResponse = self
            .transport
            .call(Method::POST, API_MICROSERVICES, &self.headers, Some(body))
            .await?
            .json(StatusCode::OK)?;

        info!(
            "Registered service {} ({}), serviceId: {}",
            service.service_name, service.version, created.service_id
        );
        Ok(created.service_id)
    }

    /// Return the existing service id, or create the service
    pub async fn register_service(&self, service: &MicroService) -> Result<String> {
        match self.get_service_id(service).await {
            Ok(Some(service_id)) => {
                debug!("Service {} already registered as {}", service.service_name, service_id);
                return Ok(service_id);
            }
            Ok(None) => {}
            Err(e) => warn!("Existence check for {} failed: {}", service.service_name, e),
        }
        self.create_service(service).await
    }

    /// Delete a service record
    pub async fn unregister_service(&self, service_id: &str) -> Result<()> {
        self.transport
            .call(
                Method::DELETE,
                &format!("{}/{}", API_MICROSERVICES, service_id),
                &self.headers,
                None,
            )
            .await?
            .expect_status(StatusCode::OK)?;

        info!("Unregistered service {}", service_id);
        Ok(())
    }

    /// Attach an instance to a service
    pub async fn register_instance(
        &self,
        service_id: &str,
        instance: &MicroServiceInstance,
    ) -> Result<String> {
        let body = serde_json::to_vec(&RegisterInstanceRequest {
            instance: instance.clone(),
        })?;

        let registered: RegisterInstanceResponse = self
            .transport
            .call(
                Method::POST,
                &format!("{}/{}/instances", API_MICROSERVICES, service_id),
                &self.headers,
                Some(body),
            )
            .await?
            .json(StatusCode::OK)?;

        info!(
            "Registered instance of {}, instanceId: {}",
            service_id, registered.instance_id
        );
        Ok(registered.instance_id)
    }

    /// Remove an instance from a service
    pub async fn unregister_instance(&self, service_id: &str, instance_id: &str) -> Result<()> {
        self.transport
            .call(
                Method::DELETE,
                &format!("{}/{}/instances/{}", API_MICROSERVICES, service_id, instance_id),
                &self.headers,
                None,
            )
            .await?
            .expect_status(StatusCode::OK)?;

        info!("Unregistered instance {} of {}", instance_id, service_id);
        Ok(())
    }

    /// Find the current instances of a provider on behalf of a consumer
    pub async fn discover(
        &self,
        consumer_id: &str,
        provider: &MicroService,
    ) -> Result<Vec<MicroServiceInstance>> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("appId", &provider.app_id)
            .append_pair("serviceName", &provider.service_name)
            .append_pair("version", &provider.version)
            .finish();

        let mut headers = self.headers.clone();
        headers.insert(HEADER_CONSUMER_ID, header_value(consumer_id)?);

        let found: GetInstancesResponse = self
            .transport
            .call(
                Method::GET,
                &format!("{}?{}", API_DISCOVERY_INSTANCES, query),
                &headers,
                None,
            )
            .await?
            .json(StatusCode::OK)?;

        if found.instances.is_empty() {
            return Err(Error::ProviderNotFound {
                app_id: provider.app_id.clone(),
                name: provider.service_name.clone(),
                version: provider.version.clone(),
            });
        }

        debug!(
            "Discovered {} instance(s) of {}",
            found.instances.len(),
            provider.service_name
        );
        Ok(found.instances)
    }

    /// Renew the lease of one or more instances
    pub async fn heartbeat(&self, instances: &[HeartbeatSetElement]) -> Result<()> {
        let body = serde_json::to_vec(&HeartbeatSetRequest {
            instances: instances.to_vec(),
        })?;

        self.transport
            .call(Method::PUT, API_HEARTBEATS, &self.headers, Some(body))
            .await?
            .expect_status(StatusCode::OK)
    }

    /// Subscribe to membership changes of a provider.
    ///
    /// Calls `handler` for every event until the token is cancelled
    /// (`Ok(())`) or the stream fails or closes (`Err`). Malformed events are
    /// logged and dropped. There is no reconnect.
    pub async fn watch<F>(
        &self,
        service_id: &str,
        token: &CancellationToken,
        mut handler: F,
    ) -> Result<()>
    where
        F: FnMut(WatchInstanceResponse) + Send,
    {
        let path = format!("{}/{}/watcher", API_MICROSERVICES, service_id);
        let mut stream = self.transport.stream_dial(&path, &self.headers).await?;
        info!("Watching provider {}", service_id);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Watch on {} cancelled", service_id);
                    return Ok(());
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WatchInstanceResponse>(text.as_str()) {
                            Ok(event) => handler(event),
                            Err(e) => {
                                warn!("Dropping malformed watch event {}: {}", text.as_str(), e)
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Watch stream for {} closed", service_id);
                        return Err(Error::WatchClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Watch stream for {} failed: {}", service_id, e);
                        return Err(e);
                    }
                }
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Config(format!("invalid header value {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Connector, EventStream, HttpRequest, Response};
    use async_trait::async_trait;
    use futures::lock::Mutex;
    use std::sync::Arc;
    use url::Url;

    /// Records requests and replies with a fixed response
    struct Recorder {
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl Connector for Recorder {
        async fn send(&self, request: HttpRequest) -> Result<Response> {
            self.seen.lock().await.push(request);
            Ok(Response::new(self.status, self.body))
        }

        async fn dial(&self, url: Url, _headers: HeaderMap) -> Result<EventStream> {
            Err(Error::transport("GET", url, "not supported"))
        }
    }

    fn client(status: StatusCode, body: &'static str) -> (RegistryClient, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        });
        let tenant = Tenant {
            domain: "acme".to_string(),
            project: "shop".to_string(),
        };
        let transport = Transport::with_connector(["http://sc:30100"], recorder.clone());
        (RegistryClient::with_transport(tenant, transport).unwrap(), recorder)
    }

    #[tokio::test]
    async fn test_existence_query_and_tenant_headers() {
        let (client, recorder) = client(StatusCode::OK, r#"{"serviceId":"svc-1"}"#);
        let service = MicroService::new("hello app", "provider", "1.0.0");

        let id = client.get_service_id(&service).await.unwrap();
        assert_eq!(id.as_deref(), Some("svc-1"));

        let seen = recorder.seen.lock().await;
        let request = &seen[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.path(), "/registry/v3/existence");
        assert_eq!(
            request.url.query(),
            Some("type=microservice&appId=hello+app&serviceName=provider&version=1.0.0")
        );
        assert_eq!(request.headers[HEADER_DOMAIN], "acme");
        assert_eq!(request.headers[HEADER_PROJECT], "shop");
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_existence_error_status_means_absent() {
        let (client, _) = client(StatusCode::BAD_REQUEST, r#"{"errorCode":"400012"}"#);
        let service = MicroService::new("app", "provider", "1.0.0");
        assert_eq!(client.get_service_id(&service).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_discover_sends_consumer_id() {
        let (client, recorder) = client(
            StatusCode::OK,
            r#"{"instances":[{"instanceId":"i1","serviceId":"p1","hostName":"h","endpoints":["rest://127.0.0.1:8080"]}]}"#,
        );
        let provider = MicroService::new("app", "provider", "latest");

        let instances = client.discover("consumer-1", &provider).await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].service_id, "p1");

        let seen = recorder.seen.lock().await;
        assert_eq!(seen[0].headers[HEADER_CONSUMER_ID], "consumer-1");
        assert_eq!(seen[0].url.path(), "/registry/v3/instances");
    }

    #[tokio::test]
    async fn test_discover_without_instances_is_not_found() {
        let (client, _) = client(StatusCode::OK, r#"{"instances":[]}"#);
        let provider = MicroService::new("app", "provider", "latest");
        let err = client.discover("consumer-1", &provider).await.unwrap_err();
        assert!(matches!(err, Error::ProviderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_heartbeat_protocol_error_is_surfaced() {
        let (client, recorder) = client(StatusCode::NOT_FOUND, "instance does not exist");
        let beat = HeartbeatSetElement {
            service_id: "s1".to_string(),
            instance_id: "i1".to_string(),
        };

        let err = client.heartbeat(&[beat]).await.unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("instance does not exist"));

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::PUT);
        assert_eq!(
            seen[0].body.as_deref(),
            Some(br#"{"Instances":[{"serviceId":"s1","instanceId":"i1"}]}"#.as_slice())
        );
    }

    #[tokio::test]
    async fn test_unregister_paths() {
        let (client, recorder) = client(StatusCode::OK, "");
        client.unregister_instance("s1", "i1").await.unwrap();
        client.unregister_service("s1").await.unwrap();

        let seen = recorder.seen.lock().await;
        assert_eq!(seen[0].method, Method::DELETE);
        assert_eq!(seen[0].url.path(), "/registry/v3/microservices/s1/instances/i1");
        assert_eq!(seen[1].url.path(), "/registry/v3/microservices/s1");
    }
}
